use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{models::usermodel::BloodGroup, utils::geo::GeoPoint};

pub const MIN_UNITS: i32 = 1;
pub const MAX_UNITS: i32 = 10;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn to_str(&self) -> &str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    /// Statuses that still block the requester from deleting their account.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RequestStatus::Pending | RequestStatus::InProgress | RequestStatus::Accepted
        )
    }

    /// Statuses shown to donors browsing nearby requests.
    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::InProgress)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "urgency_level", rename_all = "snake_case")]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn to_str(&self) -> &str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "acceptance_status", rename_all = "snake_case")]
#[serde(rename_all = "UPPERCASE")]
pub enum AcceptanceStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AcceptanceStatus {
    pub fn to_str(&self) -> &str {
        match self {
            AcceptanceStatus::Pending => "pending",
            AcceptanceStatus::Confirmed => "confirmed",
            AcceptanceStatus::Completed => "completed",
            AcceptanceStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct BloodRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub blood_group: BloodGroup,
    pub units: i32,
    pub hospital_name: String,
    pub hospital_address: String,
    pub longitude: f64,
    pub latitude: f64,
    pub urgency: Urgency,
    pub required_by: DateTime<Utc>,
    pub status: RequestStatus,
    pub notes: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BloodRequest {
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_columns(Some(self.longitude), Some(self.latitude))
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending && self.required_by < now
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Acceptance {
    pub id: Uuid,
    pub request_id: Uuid,
    pub donor_id: Uuid,
    pub accepted_at: DateTime<Utc>,
    pub status: AcceptanceStatus,
    pub notes: Option<String>,
}

/// Validated input for a new request.
#[derive(Debug, Clone)]
pub struct NewBloodRequest {
    pub blood_group: BloodGroup,
    pub units: i32,
    pub hospital_name: String,
    pub hospital_address: String,
    pub location: GeoPoint,
    pub urgency: Urgency,
    pub required_by: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A request together with its acceptances, in acceptance order.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetails {
    #[serde(flatten)]
    pub request: BloodRequest,
    pub accepted_donors: Vec<Acceptance>,
}

impl RequestDetails {
    pub fn accepted_count(&self) -> usize {
        accepted_count(&self.accepted_donors)
    }

    pub fn remaining_units(&self) -> i32 {
        remaining_units(self.request.units, &self.accepted_donors)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NearbyRequest {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: BloodRequest,
    pub distance_m: f64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Donor {0} has already accepted this request")]
    DuplicateAcceptance(Uuid),

    #[error("Request already has {units} accepted donor(s)")]
    CapacityExceeded { units: i32 },

    #[error("Donor {0} has not accepted this request")]
    DonorNotFound(Uuid),

    #[error("Cannot {action} a request that is {from:?}")]
    InvalidTransition { from: RequestStatus, action: &'static str },
}

/// Confirmed and completed acceptances. Pending ones do not count.
pub fn accepted_count(acceptances: &[Acceptance]) -> usize {
    acceptances
        .iter()
        .filter(|a| matches!(a.status, AcceptanceStatus::Confirmed | AcceptanceStatus::Completed))
        .count()
}

pub fn completed_count(acceptances: &[Acceptance]) -> usize {
    acceptances
        .iter()
        .filter(|a| a.status == AcceptanceStatus::Completed)
        .count()
}

pub fn remaining_units(units: i32, acceptances: &[Acceptance]) -> i32 {
    (units - accepted_count(acceptances) as i32).max(0)
}

/// Guards a new acceptance and returns the status the request moves to.
/// Capacity is measured against the raw list length, pending entries included.
pub fn check_accept(
    request: &BloodRequest,
    acceptances: &[Acceptance],
    donor_id: Uuid,
) -> Result<RequestStatus, LifecycleError> {
    if matches!(
        request.status,
        RequestStatus::Cancelled | RequestStatus::Expired | RequestStatus::Completed
    ) {
        return Err(LifecycleError::InvalidTransition {
            from: request.status,
            action: "accept",
        });
    }

    if acceptances.iter().any(|a| a.donor_id == donor_id) {
        return Err(LifecycleError::DuplicateAcceptance(donor_id));
    }

    if acceptances.len() >= request.units as usize {
        return Err(LifecycleError::CapacityExceeded { units: request.units });
    }

    if acceptances.len() + 1 >= request.units as usize {
        Ok(RequestStatus::Accepted)
    } else {
        Ok(RequestStatus::InProgress)
    }
}

/// Status after a donor entry changed.
pub fn status_after_donor_update(units: i32, acceptances: &[Acceptance]) -> RequestStatus {
    let units = units as usize;

    if completed_count(acceptances) >= units {
        RequestStatus::Completed
    } else if accepted_count(acceptances) >= units {
        RequestStatus::Accepted
    } else if !acceptances.is_empty() {
        RequestStatus::InProgress
    } else {
        RequestStatus::Pending
    }
}

/// Applies a donor status change to `acceptances` in place and returns the new
/// request status.
pub fn apply_donor_update(
    request: &BloodRequest,
    acceptances: &mut [Acceptance],
    donor_id: Uuid,
    new_status: AcceptanceStatus,
) -> Result<RequestStatus, LifecycleError> {
    if matches!(
        request.status,
        RequestStatus::Cancelled | RequestStatus::Expired | RequestStatus::Completed
    ) {
        return Err(LifecycleError::InvalidTransition {
            from: request.status,
            action: "update donors of",
        });
    }

    let entry = acceptances
        .iter_mut()
        .find(|a| a.donor_id == donor_id)
        .ok_or(LifecycleError::DonorNotFound(donor_id))?;
    entry.status = new_status;

    Ok(status_after_donor_update(request.units, acceptances))
}

pub fn check_cancel(status: RequestStatus) -> Result<(), LifecycleError> {
    if status == RequestStatus::Completed {
        return Err(LifecycleError::InvalidTransition {
            from: status,
            action: "cancel",
        });
    }
    Ok(())
}

/// Admin override: anything except leaving a completed request.
pub fn check_override(from: RequestStatus, to: RequestStatus) -> Result<(), LifecycleError> {
    if from == RequestStatus::Completed && to != RequestStatus::Completed {
        return Err(LifecycleError::InvalidTransition {
            from,
            action: "change the status of",
        });
    }
    Ok(())
}

#[cfg(test)]
pub fn sample_request(units: i32, status: RequestStatus) -> BloodRequest {
    let now = Utc::now();
    BloodRequest {
        id: Uuid::new_v4(),
        requester_id: Uuid::new_v4(),
        blood_group: BloodGroup::OPositive,
        units,
        hospital_name: "City Hospital".to_string(),
        hospital_address: "1 MG Road".to_string(),
        longitude: 77.59,
        latitude: 12.97,
        urgency: Urgency::High,
        required_by: now + chrono::Duration::days(1),
        status,
        notes: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
pub fn sample_acceptance(request_id: Uuid, status: AcceptanceStatus) -> Acceptance {
    Acceptance {
        id: Uuid::new_v4(),
        request_id,
        donor_id: Uuid::new_v4(),
        accepted_at: Utc::now(),
        status,
        notes: None,
    }
}

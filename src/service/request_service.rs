// services/request_service.rs
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::Store,
    models::{
        requestmodel::{
            AcceptanceStatus, BloodRequest, NewBloodRequest, RequestDetails, RequestStatus,
            MAX_UNITS, MIN_UNITS,
        },
        usermodel::{User, UserRole},
    },
    service::{
        error::ServiceError,
        matching_service::MatchingService,
        notification_service::{
            DispatchReport, NotificationError, NotificationService, PushMessage, PushRecipient,
        },
    },
};

/// Outcome of the donor fan-out attached to a newly created request.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub backend_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedRequest {
    pub request: RequestDetails,
    pub notifications: DispatchSummary,
}

/// The accept / status / cancel workflow around a blood request.
#[derive(Debug, Clone)]
pub struct RequestService {
    store: Arc<dyn Store>,
    matching: MatchingService,
    notifications: NotificationService,
}

impl RequestService {
    pub fn new(
        store: Arc<dyn Store>,
        matching: MatchingService,
        notifications: NotificationService,
    ) -> Self {
        Self {
            store,
            matching,
            notifications,
        }
    }

    pub async fn create_request(
        &self,
        requester: &User,
        new_request: NewBloodRequest,
    ) -> Result<CreatedRequest, ServiceError> {
        if requester.role != UserRole::Requester {
            return Err(ServiceError::Forbidden(
                "Only requesters can create blood requests".to_string(),
            ));
        }
        if !(MIN_UNITS..=MAX_UNITS).contains(&new_request.units) {
            return Err(ServiceError::BadInput(format!(
                "units must be between {} and {}",
                MIN_UNITS, MAX_UNITS
            )));
        }
        if new_request.required_by <= Utc::now() {
            return Err(ServiceError::BadInput(
                "requiredBy must be in the future".to_string(),
            ));
        }

        let request = self.store.create_request(requester.id, new_request).await?;

        tracing::info!(
            "Blood request {} created by {} ({} unit(s) of {})",
            request.id,
            requester.id,
            request.units,
            request.blood_group.to_str()
        );

        let notifications = self.alert_nearby_donors(&request).await;

        Ok(CreatedRequest {
            request: RequestDetails {
                request,
                accepted_donors: Vec::new(),
            },
            notifications,
        })
    }

    /// Best effort: lookup and delivery failures are logged and summarised,
    /// never returned.
    async fn alert_nearby_donors(&self, request: &BloodRequest) -> DispatchSummary {
        let donors = match self.matching.donors_for_request(request).await {
            Ok(donors) => donors,
            Err(e) => {
                tracing::warn!("Donor lookup for request {} failed: {}", request.id, e);
                Vec::new()
            }
        };

        let recipients: Vec<PushRecipient> = donors
            .into_iter()
            .map(|d| PushRecipient::new(d.user.id, d.user.push_token))
            .collect();

        let message = PushMessage::new(
            format!("Urgent: {} blood needed", request.blood_group.to_str()),
            format!(
                "{} unit(s) needed at {}",
                request.units, request.hospital_name
            ),
        )
        .with_data("request_id", request.id)
        .with_data("urgency", request.urgency.to_str());

        match self.notifications.notify_many(&recipients, &message).await {
            Ok(report) => {
                self.clear_stale_tokens(&report).await;
                DispatchSummary {
                    success_count: report.success_count,
                    failure_count: report.failure_count,
                    backend_available: true,
                }
            }
            Err(NotificationError::BackendUnavailable) => {
                tracing::warn!(
                    "Request {} created without donor alerts: push backend unavailable",
                    request.id
                );
                DispatchSummary {
                    success_count: 0,
                    failure_count: recipients.len(),
                    backend_available: false,
                }
            }
            Err(e) => {
                tracing::error!("Donor alerts for request {} failed: {}", request.id, e);
                DispatchSummary {
                    success_count: 0,
                    failure_count: recipients.len(),
                    backend_available: true,
                }
            }
        }
    }

    async fn clear_stale_tokens(&self, report: &DispatchReport) {
        if report.stale_recipients.is_empty() {
            return;
        }
        match self.store.clear_push_tokens(&report.stale_recipients).await {
            Ok(cleared) => tracing::info!("Cleared {} unregistered push token(s)", cleared),
            Err(e) => tracing::error!("Failed to clear stale push tokens: {}", e),
        }
    }

    async fn notify_user(&self, user_id: Uuid, message: PushMessage) {
        let user = match self.store.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Could not load user {} for notification: {}", user_id, e);
                return;
            }
        };

        let recipient = PushRecipient::new(user.id, user.push_token);
        if !self.notifications.notify_one(&recipient, &message).await {
            tracing::debug!("Notification '{}' not delivered to {}", message.title, user_id);
        }
    }

    /// Loads a request with its acceptances, expiring it first if its
    /// deadline passed while still pending.
    pub async fn load_request(&self, request_id: Uuid) -> Result<RequestDetails, ServiceError> {
        let mut request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(ServiceError::RequestNotFound(request_id))?;

        let now = Utc::now();
        if request.is_overdue(now) && self.store.expire_request_if_overdue(request_id, now).await? {
            tracing::info!("Blood request {} expired", request_id);
            request = self
                .store
                .get_request(request_id)
                .await?
                .ok_or(ServiceError::RequestNotFound(request_id))?;
        }

        let accepted_donors = self.store.get_acceptances(request_id).await?;

        Ok(RequestDetails {
            request,
            accepted_donors,
        })
    }

    pub async fn accept(
        &self,
        request_id: Uuid,
        donor: &User,
        notes: Option<String>,
    ) -> Result<RequestDetails, ServiceError> {
        if !donor.is_donor() {
            return Err(ServiceError::Forbidden(
                "Only donors can accept blood requests".to_string(),
            ));
        }

        // Runs the lazy expiry before the locked update.
        self.load_request(request_id).await?;

        let details = self.store.accept_donor(request_id, donor.id, notes).await?;

        tracing::info!(
            "Donor {} accepted request {} ({}/{} slots, status {})",
            donor.id,
            request_id,
            details.accepted_donors.len(),
            details.request.units,
            details.request.status.to_str()
        );

        self.notify_user(
            details.request.requester_id,
            PushMessage::new("Donor found", "A donor accepted your request")
                .with_data("request_id", request_id)
                .with_data("donor_id", donor.id),
        )
        .await;

        Ok(details)
    }

    /// The owning requester or the donor themself may change a donor entry.
    pub async fn update_donor_status(
        &self,
        request_id: Uuid,
        actor: &User,
        donor_id: Uuid,
        status: AcceptanceStatus,
    ) -> Result<RequestDetails, ServiceError> {
        let current = self.load_request(request_id).await?;

        if actor.id != current.request.requester_id && actor.id != donor_id {
            return Err(ServiceError::Forbidden(
                "Only the requester or the donor can update this acceptance".to_string(),
            ));
        }

        let details = self
            .store
            .update_donor_status(request_id, donor_id, status)
            .await?;

        tracing::info!(
            "Donor {} on request {} set to {}; request is {}",
            donor_id,
            request_id,
            status.to_str(),
            details.request.status.to_str()
        );

        if status == AcceptanceStatus::Confirmed {
            self.notify_user(
                donor_id,
                PushMessage::new(
                    "Donation confirmed",
                    format!("Your donation at {} is confirmed", details.request.hospital_name),
                )
                .with_data("request_id", request_id),
            )
            .await;
        }

        Ok(details)
    }

    pub async fn cancel(&self, request_id: Uuid, actor: &User) -> Result<BloodRequest, ServiceError> {
        let current = self.load_request(request_id).await?;

        if actor.id != current.request.requester_id {
            return Err(ServiceError::Forbidden(
                "Only the requester can cancel this request".to_string(),
            ));
        }

        let request = self.store.cancel_request(request_id).await?;

        // Committed donors are left as they are and not notified.
        if !current.accepted_donors.is_empty() {
            tracing::warn!(
                "Request {} cancelled with {} donor(s) already committed",
                request_id,
                current.accepted_donors.len()
            );
        } else {
            tracing::info!("Request {} cancelled", request_id);
        }

        Ok(request)
    }

    pub async fn admin_set_status(
        &self,
        request_id: Uuid,
        status: RequestStatus,
    ) -> Result<BloodRequest, ServiceError> {
        let request = self.store.override_request_status(request_id, status).await?;
        tracing::info!("Admin set request {} to {}", request_id, status.to_str());
        Ok(request)
    }

    pub async fn requests_for_requester(&self, requester: &User) -> Result<Vec<BloodRequest>, ServiceError> {
        Ok(self.store.get_requests_by_requester(requester.id).await?)
    }

    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        Ok(self.store.expire_overdue_requests(Utc::now()).await?)
    }
}

// services/matching_service.rs
use std::sync::Arc;

use crate::{
    db::{query_timeout::QueryTimeout, Store},
    models::{
        requestmodel::{BloodRequest, NearbyRequest},
        usermodel::{BloodGroup, NearbyDonor},
    },
    service::error::ServiceError,
    utils::geo::{validate_radius, GeoPoint},
};

/// Proximity matcher over the user directory and the request store.
#[derive(Debug, Clone)]
pub struct MatchingService {
    store: Arc<dyn Store>,
    default_radius_m: f64,
}

impl MatchingService {
    pub fn new(store: Arc<dyn Store>, default_radius_m: f64) -> Self {
        Self {
            store,
            default_radius_m,
        }
    }

    pub fn resolve_radius(&self, radius_m: Option<f64>) -> Result<f64, ServiceError> {
        validate_radius(radius_m.unwrap_or(self.default_radius_m)).map_err(ServiceError::BadInput)
    }

    pub async fn nearby_donors(
        &self,
        origin: GeoPoint,
        radius_m: Option<f64>,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyDonor>, ServiceError> {
        let radius = self.resolve_radius(radius_m)?;

        let donors = QueryTimeout::execute_with_timeout(
            self.store.find_donors_near(origin, radius, blood_group),
            QueryTimeout::LOOKUP_TIMEOUT,
        )
        .await?;

        tracing::debug!(
            "Found {} donors within {}m of ({}, {})",
            donors.len(),
            radius,
            origin.longitude,
            origin.latitude
        );

        Ok(donors)
    }

    pub async fn nearby_requests(
        &self,
        origin: GeoPoint,
        radius_m: Option<f64>,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyRequest>, ServiceError> {
        let radius = self.resolve_radius(radius_m)?;

        QueryTimeout::execute_with_timeout(
            self.store.find_requests_near(origin, radius, blood_group),
            QueryTimeout::LOOKUP_TIMEOUT,
        )
        .await
    }

    /// Donors matching a request's blood group around its hospital, never the
    /// requester themself.
    pub async fn donors_for_request(
        &self,
        request: &BloodRequest,
    ) -> Result<Vec<NearbyDonor>, ServiceError> {
        let Some(origin) = request.location() else {
            return Ok(Vec::new());
        };

        let donors = self
            .nearby_donors(origin, None, Some(request.blood_group))
            .await?;

        Ok(donors
            .into_iter()
            .filter(|d| d.user.id != request.requester_id)
            .collect())
    }
}

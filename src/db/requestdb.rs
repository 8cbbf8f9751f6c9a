// db/requestdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::db::DBClient;
use super::userdb::NEARBY_LIMIT;

use crate::{
    models::{
        requestmodel::{
            apply_donor_update, check_accept, check_cancel, check_override, Acceptance,
            AcceptanceStatus, BloodRequest, NearbyRequest, NewBloodRequest, RequestDetails,
            RequestStatus,
        },
        usermodel::BloodGroup,
    },
    service::error::ServiceError,
    utils::geo::{BoundingBox, GeoPoint, SQL_BOUNDING_BOX, SQL_DISTANCE_M},
};

pub const REQUEST_COLUMNS: &str = "id, requester_id, blood_group, units, hospital_name, \
    hospital_address, longitude, latitude, urgency, required_by, status, notes, version, \
    created_at, updated_at";

pub const ACCEPTANCE_COLUMNS: &str = "id, request_id, donor_id, accepted_at, status, notes";

#[async_trait]
pub trait BloodRequestExt: Send + Sync {
    async fn create_request(
        &self,
        requester_id: Uuid,
        new_request: NewBloodRequest,
    ) -> Result<BloodRequest, sqlx::Error>;

    async fn get_request(&self, request_id: Uuid) -> Result<Option<BloodRequest>, sqlx::Error>;

    /// Acceptances for a request in the order donors accepted.
    async fn get_acceptances(&self, request_id: Uuid) -> Result<Vec<Acceptance>, sqlx::Error>;

    async fn get_requests_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<BloodRequest>, sqlx::Error>;

    /// Pending and in-progress requests inside `radius_m`, nearest first.
    async fn find_requests_near(
        &self,
        origin: GeoPoint,
        radius_m: f64,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyRequest>, sqlx::Error>;

    /// Moves one pending request past its deadline to EXPIRED. Returns whether it changed.
    async fn expire_request_if_overdue(
        &self,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>;

    async fn expire_overdue_requests(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error>;

    async fn accept_donor(
        &self,
        request_id: Uuid,
        donor_id: Uuid,
        notes: Option<String>,
    ) -> Result<RequestDetails, ServiceError>;

    async fn update_donor_status(
        &self,
        request_id: Uuid,
        donor_id: Uuid,
        status: AcceptanceStatus,
    ) -> Result<RequestDetails, ServiceError>;

    async fn cancel_request(&self, request_id: Uuid) -> Result<BloodRequest, ServiceError>;

    async fn override_request_status(
        &self,
        request_id: Uuid,
        status: RequestStatus,
    ) -> Result<BloodRequest, ServiceError>;
}

impl DBClient {
    async fn lock_request(
        tx: &mut Transaction<'_, Postgres>,
        request_id: Uuid,
    ) -> Result<BloodRequest, ServiceError> {
        let query = format!(
            "SELECT {} FROM blood_requests WHERE id = $1 FOR UPDATE",
            REQUEST_COLUMNS
        );

        sqlx::query_as::<_, BloodRequest>(&query)
            .bind(request_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(ServiceError::RequestNotFound(request_id))
    }

    async fn acceptances_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        request_id: Uuid,
    ) -> Result<Vec<Acceptance>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM request_acceptances WHERE request_id = $1 ORDER BY accepted_at ASC, id ASC",
            ACCEPTANCE_COLUMNS
        );

        sqlx::query_as::<_, Acceptance>(&query)
            .bind(request_id)
            .fetch_all(&mut **tx)
            .await
    }

    async fn set_status_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        request_id: Uuid,
        status: RequestStatus,
    ) -> Result<BloodRequest, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE blood_requests
            SET status = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );

        sqlx::query_as::<_, BloodRequest>(&query)
            .bind(request_id)
            .bind(status)
            .fetch_one(&mut **tx)
            .await
    }
}

#[async_trait]
impl BloodRequestExt for DBClient {
    async fn create_request(
        &self,
        requester_id: Uuid,
        new_request: NewBloodRequest,
    ) -> Result<BloodRequest, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO blood_requests (
                id, requester_id, blood_group, units, hospital_name, hospital_address,
                longitude, latitude, urgency, required_by, status, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );

        sqlx::query_as::<_, BloodRequest>(&query)
            .bind(Uuid::new_v4())
            .bind(requester_id)
            .bind(new_request.blood_group)
            .bind(new_request.units)
            .bind(new_request.hospital_name)
            .bind(new_request.hospital_address)
            .bind(new_request.location.longitude)
            .bind(new_request.location.latitude)
            .bind(new_request.urgency)
            .bind(new_request.required_by)
            .bind(new_request.notes)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<BloodRequest>, sqlx::Error> {
        let query = format!("SELECT {} FROM blood_requests WHERE id = $1", REQUEST_COLUMNS);

        sqlx::query_as::<_, BloodRequest>(&query)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_acceptances(&self, request_id: Uuid) -> Result<Vec<Acceptance>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM request_acceptances WHERE request_id = $1 ORDER BY accepted_at ASC, id ASC",
            ACCEPTANCE_COLUMNS
        );

        sqlx::query_as::<_, Acceptance>(&query)
            .bind(request_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn get_requests_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<BloodRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM blood_requests WHERE requester_id = $1 ORDER BY created_at DESC",
            REQUEST_COLUMNS
        );

        sqlx::query_as::<_, BloodRequest>(&query)
            .bind(requester_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn find_requests_near(
        &self,
        origin: GeoPoint,
        radius_m: f64,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyRequest>, sqlx::Error> {
        let bbox = BoundingBox::around(&origin, radius_m);

        let query = format!(
            r#"
            SELECT * FROM (
                SELECT {columns}, {distance} AS distance_m
                FROM blood_requests
                WHERE status IN ('pending'::request_status, 'in_progress'::request_status)
                AND {bbox}
                AND ($10::blood_group IS NULL OR blood_group = $10)
            ) AS candidates
            WHERE distance_m <= $3
            ORDER BY distance_m ASC
            LIMIT $11
            "#,
            columns = REQUEST_COLUMNS,
            distance = SQL_DISTANCE_M,
            bbox = SQL_BOUNDING_BOX,
        );

        sqlx::query_as::<_, NearbyRequest>(&query)
            .bind(origin.longitude)
            .bind(origin.latitude)
            .bind(radius_m)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.lon_spans[0].0)
            .bind(bbox.lon_spans[0].1)
            .bind(bbox.lon_spans[1].0)
            .bind(bbox.lon_spans[1].1)
            .bind(blood_group)
            .bind(NEARBY_LIMIT)
            .fetch_all(&self.pool)
            .await
    }

    async fn expire_request_if_overdue(
        &self,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE blood_requests
            SET status = 'expired', version = version + 1, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND required_by < $2
            "#
        )
        .bind(request_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_overdue_requests(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE blood_requests
            SET status = 'expired', version = version + 1, updated_at = NOW()
            WHERE status = 'pending' AND required_by < $1
            "#
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn accept_donor(
        &self,
        request_id: Uuid,
        donor_id: Uuid,
        notes: Option<String>,
    ) -> Result<RequestDetails, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let request = Self::lock_request(&mut tx, request_id).await?;
        let mut acceptances = Self::acceptances_in_tx(&mut tx, request_id).await?;

        let next_status = check_accept(&request, &acceptances, donor_id)
            .map_err(|e| ServiceError::lifecycle(request_id, e))?;

        // The unique (request_id, donor_id) index backs up the in-memory check.
        let insert = format!(
            r#"
            INSERT INTO request_acceptances (id, request_id, donor_id, status, notes)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (request_id, donor_id) DO NOTHING
            RETURNING {}
            "#,
            ACCEPTANCE_COLUMNS
        );

        let inserted = sqlx::query_as::<_, Acceptance>(&insert)
            .bind(Uuid::new_v4())
            .bind(request_id)
            .bind(donor_id)
            .bind(notes)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::DuplicateAcceptance { request_id, donor_id })?;

        let request = Self::set_status_in_tx(&mut tx, request_id, next_status).await?;

        tx.commit().await?;

        acceptances.push(inserted);
        Ok(RequestDetails {
            request,
            accepted_donors: acceptances,
        })
    }

    async fn update_donor_status(
        &self,
        request_id: Uuid,
        donor_id: Uuid,
        status: AcceptanceStatus,
    ) -> Result<RequestDetails, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let request = Self::lock_request(&mut tx, request_id).await?;
        let mut acceptances = Self::acceptances_in_tx(&mut tx, request_id).await?;

        let next_status = apply_donor_update(&request, &mut acceptances, donor_id, status)
            .map_err(|e| ServiceError::lifecycle(request_id, e))?;

        sqlx::query(
            r#"
            UPDATE request_acceptances
            SET status = $3
            WHERE request_id = $1 AND donor_id = $2
            "#
        )
        .bind(request_id)
        .bind(donor_id)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        let request = Self::set_status_in_tx(&mut tx, request_id, next_status).await?;

        tx.commit().await?;

        Ok(RequestDetails {
            request,
            accepted_donors: acceptances,
        })
    }

    async fn cancel_request(&self, request_id: Uuid) -> Result<BloodRequest, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let request = Self::lock_request(&mut tx, request_id).await?;
        check_cancel(request.status).map_err(|e| ServiceError::lifecycle(request_id, e))?;

        let request = Self::set_status_in_tx(&mut tx, request_id, RequestStatus::Cancelled).await?;

        tx.commit().await?;
        Ok(request)
    }

    async fn override_request_status(
        &self,
        request_id: Uuid,
        status: RequestStatus,
    ) -> Result<BloodRequest, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let request = Self::lock_request(&mut tx, request_id).await?;
        check_override(request.status, status)
            .map_err(|e| ServiceError::lifecycle(request_id, e))?;

        let request = Self::set_status_in_tx(&mut tx, request_id, status).await?;

        tx.commit().await?;
        Ok(request)
    }
}

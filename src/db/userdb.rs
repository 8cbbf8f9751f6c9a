// db/userdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::DBClient;

use crate::{
    models::usermodel::{BloodGroup, DeleteUserOutcome, NearbyDonor, NewUser, User, UserRole},
    utils::geo::{BoundingBox, GeoPoint, SQL_BOUNDING_BOX, SQL_DISTANCE_M},
};

pub const USER_COLUMNS: &str = "id, name, email, phone, role, blood_group, \
    longitude, latitude, is_available, push_token, \
    total_donations, last_donation_date, last_reminder_sent_at, \
    created_at, updated_at";

/// Upper bound on candidates returned by one proximity query.
pub const NEARBY_LIMIT: i64 = 200;

#[async_trait]
pub trait UserExt: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error>;

    async fn update_user_location(
        &self,
        user_id: Uuid,
        location: GeoPoint,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn update_user_availability(
        &self,
        user_id: Uuid,
        is_available: bool,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn update_push_token(
        &self,
        user_id: Uuid,
        push_token: Option<String>,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn clear_push_tokens(&self, user_ids: &[Uuid]) -> Result<u64, sqlx::Error>;

    async fn record_donation(
        &self,
        user_id: Uuid,
        donated_at: DateTime<Utc>,
    ) -> Result<Option<User>, sqlx::Error>;

    /// Deletes the user unless they own an active request or hold a pending or
    /// confirmed acceptance on one, in one statement.
    async fn delete_user(&self, user_id: Uuid) -> Result<DeleteUserOutcome, sqlx::Error>;

    /// Available donors with a location inside `radius_m`, nearest first.
    async fn find_donors_near(
        &self,
        origin: GeoPoint,
        radius_m: f64,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyDonor>, sqlx::Error>;

    /// Available donors with a push token whose last donation is older than `donated_before`.
    async fn get_donors_due_for_reminder(
        &self,
        donated_before: DateTime<Utc>,
    ) -> Result<Vec<User>, sqlx::Error>;

    async fn mark_reminded(&self, user_ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (id, name, email, phone, role, blood_group, is_available, push_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(new_user.name)
            .bind(new_user.contact.email())
            .bind(new_user.contact.phone())
            .bind(new_user.role)
            .bind(new_user.blood_group)
            .bind(new_user.role == UserRole::Donor)
            .bind(new_user.push_token)
            .fetch_one(&self.pool)
            .await
    }

    async fn update_user_location(
        &self,
        user_id: Uuid,
        location: GeoPoint,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET longitude = $2, latitude = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(location.longitude)
            .bind(location.latitude)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_user_availability(
        &self,
        user_id: Uuid,
        is_available: bool,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET is_available = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(is_available)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_push_token(
        &self,
        user_id: Uuid,
        push_token: Option<String>,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET push_token = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(push_token)
            .fetch_optional(&self.pool)
            .await
    }

    async fn clear_push_tokens(&self, user_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE users
            SET push_token = NULL, updated_at = NOW()
            WHERE id = ANY($1)
            "#
        )
        .bind(user_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn record_donation(
        &self,
        user_id: Uuid,
        donated_at: DateTime<Utc>,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET total_donations = total_donations + 1,
                last_donation_date = GREATEST(COALESCE(last_donation_date, $2), $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(donated_at)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<DeleteUserOutcome, sqlx::Error> {
        let (found, deleted): (bool, bool) = sqlx::query_as(
            r#"
            WITH blocked AS (
                SELECT 1 FROM blood_requests
                WHERE requester_id = $1
                AND status IN (
                    'pending'::request_status,
                    'in_progress'::request_status,
                    'accepted'::request_status
                )
                UNION ALL
                SELECT 1 FROM request_acceptances ra
                JOIN blood_requests br ON br.id = ra.request_id
                WHERE ra.donor_id = $1
                AND ra.status IN (
                    'pending'::acceptance_status,
                    'confirmed'::acceptance_status
                )
                AND br.status IN (
                    'pending'::request_status,
                    'in_progress'::request_status,
                    'accepted'::request_status
                )
                LIMIT 1
            ),
            deleted AS (
                DELETE FROM users
                WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM blocked)
                RETURNING id
            )
            SELECT
                EXISTS (SELECT 1 FROM users WHERE id = $1) AS found,
                EXISTS (SELECT 1 FROM deleted) AS deleted
            "#
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        // The CTE snapshot still sees the deleted row, so `found` is true on success.
        Ok(match (found, deleted) {
            (_, true) => DeleteUserOutcome::Deleted,
            (false, false) => DeleteUserOutcome::NotFound,
            (true, false) => DeleteUserOutcome::ActiveRequestExists,
        })
    }

    async fn find_donors_near(
        &self,
        origin: GeoPoint,
        radius_m: f64,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyDonor>, sqlx::Error> {
        let bbox = BoundingBox::around(&origin, radius_m);

        let query = format!(
            r#"
            SELECT * FROM (
                SELECT {columns}, {distance} AS distance_m
                FROM users
                WHERE role = 'donor'::user_role
                AND is_available = TRUE
                AND longitude IS NOT NULL AND latitude IS NOT NULL
                AND NOT (longitude = 0 AND latitude = 0)
                AND {bbox}
                AND ($10::blood_group IS NULL OR blood_group = $10)
            ) AS candidates
            WHERE distance_m <= $3
            ORDER BY distance_m ASC
            LIMIT $11
            "#,
            columns = USER_COLUMNS,
            distance = SQL_DISTANCE_M,
            bbox = SQL_BOUNDING_BOX,
        );

        sqlx::query_as::<_, NearbyDonor>(&query)
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

    async fn get_donors_due_for_reminder(
        &self,
        donated_before: DateTime<Utc>,
    ) -> Result<Vec<User>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM users
            WHERE role = 'donor'::user_role
            AND is_available = TRUE
            AND push_token IS NOT NULL
            AND last_donation_date IS NOT NULL
            AND last_donation_date <= $1
            AND (last_reminder_sent_at IS NULL OR last_reminder_sent_at < last_donation_date)
            ORDER BY last_donation_date ASC
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(donated_before)
            .fetch_all(&self.pool)
            .await
    }

    async fn mark_reminded(&self, user_ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_reminder_sent_at = $2
            WHERE id = ANY($1)
            "#
        )
        .bind(user_ids)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// In-memory store used by the service tests. Mirrors the Postgres queries in
// userdb.rs and requestdb.rs closely enough to exercise the workflow rules.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{requestdb::BloodRequestExt, userdb::UserExt};
use crate::{
    models::{
        requestmodel::{
            apply_donor_update, check_accept, check_cancel, check_override, Acceptance,
            AcceptanceStatus, BloodRequest, NearbyRequest, NewBloodRequest, RequestDetails,
            RequestStatus,
        },
        usermodel::{BloodGroup, DeleteUserOutcome, NearbyDonor, NewUser, User, UserRole},
    },
    service::error::ServiceError,
    utils::geo::{within_radius_sorted, BoundingBox, GeoPoint},
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    requests: Mutex<HashMap<Uuid, BloodRequest>>,
    acceptances: Mutex<Vec<Acceptance>>,
    lookup_delay: Mutex<Option<Duration>>,
    /// Held for a whole mutation, like the row lock in the Postgres store.
    row_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) -> User {
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }

    pub fn insert_request(&self, request: BloodRequest) -> BloodRequest {
        self.requests
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        request
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    pub fn request(&self, id: Uuid) -> Option<BloodRequest> {
        self.requests.lock().unwrap().get(&id).cloned()
    }

    /// Makes proximity lookups sleep before answering.
    pub fn slow_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    async fn maybe_delay(&self) {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn acceptances_for(&self, request_id: Uuid) -> Vec<Acceptance> {
        let mut entries: Vec<Acceptance> = self
            .acceptances
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.request_id == request_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.accepted_at.cmp(&b.accepted_at).then(a.id.cmp(&b.id)));
        entries
    }

    fn update_user<F: FnOnce(&mut User)>(&self, id: Uuid, change: F) -> Option<User> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id)?;
        change(user);
        user.updated_at = Utc::now();
        Some(user.clone())
    }

    fn set_status(&self, request_id: Uuid, status: RequestStatus) -> Option<BloodRequest> {
        let mut requests = self.requests.lock().unwrap();
        let request = requests.get_mut(&request_id)?;
        request.status = status;
        request.version += 1;
        request.updated_at = Utc::now();
        Some(request.clone())
    }
}

#[async_trait]
impl UserExt for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.user(user_id))
    }

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.contact.email().map(str::to_string),
            phone: new_user.contact.phone().map(str::to_string),
            role: new_user.role,
            blood_group: new_user.blood_group,
            longitude: None,
            latitude: None,
            is_available: new_user.role == UserRole::Donor,
            push_token: new_user.push_token,
            total_donations: 0,
            last_donation_date: None,
            last_reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        Ok(self.insert_user(user))
    }

    async fn update_user_location(
        &self,
        user_id: Uuid,
        location: GeoPoint,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self.update_user(user_id, |u| {
            u.longitude = Some(location.longitude);
            u.latitude = Some(location.latitude);
        }))
    }

    async fn update_user_availability(
        &self,
        user_id: Uuid,
        is_available: bool,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self.update_user(user_id, |u| u.is_available = is_available))
    }

    async fn update_push_token(
        &self,
        user_id: Uuid,
        push_token: Option<String>,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self.update_user(user_id, |u| u.push_token = push_token))
    }

    async fn clear_push_tokens(&self, user_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        let mut cleared = 0;
        for id in user_ids {
            if self.update_user(*id, |u| u.push_token = None).is_some() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn record_donation(
        &self,
        user_id: Uuid,
        donated_at: DateTime<Utc>,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self.update_user(user_id, |u| {
            u.total_donations += 1;
            u.last_donation_date = Some(match u.last_donation_date {
                Some(previous) if previous > donated_at => previous,
                _ => donated_at,
            });
        }))
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<DeleteUserOutcome, sqlx::Error> {
        let _row = self.row_lock.lock().unwrap();
        let requests = self.requests.lock().unwrap();
        let mut acceptances = self.acceptances.lock().unwrap();

        let owns_active = requests
            .values()
            .any(|r| r.requester_id == user_id && r.status.is_active());
        let committed_to_active = acceptances.iter().any(|a| {
            a.donor_id == user_id
                && matches!(a.status, AcceptanceStatus::Pending | AcceptanceStatus::Confirmed)
                && requests
                    .get(&a.request_id)
                    .is_some_and(|r| r.status.is_active())
        });

        let mut users = self.users.lock().unwrap();
        if !users.contains_key(&user_id) {
            return Ok(DeleteUserOutcome::NotFound);
        }
        if owns_active || committed_to_active {
            return Ok(DeleteUserOutcome::ActiveRequestExists);
        }
        users.remove(&user_id);
        acceptances.retain(|a| a.donor_id != user_id);
        Ok(DeleteUserOutcome::Deleted)
    }

    async fn find_donors_near(
        &self,
        origin: GeoPoint,
        radius_m: f64,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyDonor>, sqlx::Error> {
        self.maybe_delay().await;
        let bbox = BoundingBox::around(&origin, radius_m);

        let candidates: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.is_donor() && u.is_available)
            .filter(|u| blood_group.map_or(true, |g| u.blood_group == g))
            .filter(|u| u.location().map_or(false, |p| bbox.contains(&p)))
            .cloned()
            .collect();

        Ok(within_radius_sorted(&origin, radius_m, candidates, User::location)
            .into_iter()
            .map(|(user, distance_m)| NearbyDonor { user, distance_m })
            .collect())
    }

    async fn get_donors_due_for_reminder(
        &self,
        donated_before: DateTime<Utc>,
    ) -> Result<Vec<User>, sqlx::Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.is_donor() && u.is_available && u.push_token.is_some())
            .filter(|u| matches!(u.last_donation_date, Some(d) if d <= donated_before))
            .filter(|u| match (u.last_reminder_sent_at, u.last_donation_date) {
                (Some(reminded), Some(donated)) => reminded < donated,
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn mark_reminded(&self, user_ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        let mut marked = 0;
        for id in user_ids {
            if let Some(user) = users.get_mut(id) {
                user.last_reminder_sent_at = Some(at);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[async_trait]
impl BloodRequestExt for MemoryStore {
    async fn create_request(
        &self,
        requester_id: Uuid,
        new_request: NewBloodRequest,
    ) -> Result<BloodRequest, sqlx::Error> {
        let now = Utc::now();
        let request = BloodRequest {
            id: Uuid::new_v4(),
            requester_id,
            blood_group: new_request.blood_group,
            units: new_request.units,
            hospital_name: new_request.hospital_name,
            hospital_address: new_request.hospital_address,
            longitude: new_request.location.longitude,
            latitude: new_request.location.latitude,
            urgency: new_request.urgency,
            required_by: new_request.required_by,
            status: RequestStatus::Pending,
            notes: new_request.notes,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        Ok(self.insert_request(request))
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<BloodRequest>, sqlx::Error> {
        Ok(self.request(request_id))
    }

    async fn get_acceptances(&self, request_id: Uuid) -> Result<Vec<Acceptance>, sqlx::Error> {
        Ok(self.acceptances_for(request_id))
    }

    async fn get_requests_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<BloodRequest>, sqlx::Error> {
        let mut requests: Vec<BloodRequest> = self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.requester_id == requester_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn find_requests_near(
        &self,
        origin: GeoPoint,
        radius_m: f64,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<NearbyRequest>, sqlx::Error> {
        self.maybe_delay().await;
        let bbox = BoundingBox::around(&origin, radius_m);

        let candidates: Vec<BloodRequest> = self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status.is_open())
            .filter(|r| blood_group.map_or(true, |g| r.blood_group == g))
            .filter(|r| r.location().map_or(false, |p| bbox.contains(&p)))
            .cloned()
            .collect();

        Ok(within_radius_sorted(&origin, radius_m, candidates, BloodRequest::location)
            .into_iter()
            .map(|(request, distance_m)| NearbyRequest { request, distance_m })
            .collect())
    }

    async fn expire_request_if_overdue(
        &self,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let _row = self.row_lock.lock().unwrap();
        let overdue = self
            .request(request_id)
            .map(|r| r.is_overdue(now))
            .unwrap_or(false);
        if overdue {
            self.set_status(request_id, RequestStatus::Expired);
        }
        Ok(overdue)
    }

    async fn expire_overdue_requests(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let _row = self.row_lock.lock().unwrap();
        let overdue: Vec<Uuid> = self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_overdue(now))
            .map(|r| r.id)
            .collect();
        for id in &overdue {
            self.set_status(*id, RequestStatus::Expired);
        }
        Ok(overdue.len() as u64)
    }

    async fn accept_donor(
        &self,
        request_id: Uuid,
        donor_id: Uuid,
        notes: Option<String>,
    ) -> Result<RequestDetails, ServiceError> {
        let _row = self.row_lock.lock().unwrap();
        let request = self
            .request(request_id)
            .ok_or(ServiceError::RequestNotFound(request_id))?;
        let mut acceptances = self.acceptances_for(request_id);

        let next_status = check_accept(&request, &acceptances, donor_id)
            .map_err(|e| ServiceError::lifecycle(request_id, e))?;

        let acceptance = Acceptance {
            id: Uuid::new_v4(),
            request_id,
            donor_id,
            accepted_at: Utc::now(),
            status: AcceptanceStatus::Pending,
            notes,
        };
        self.acceptances.lock().unwrap().push(acceptance.clone());
        acceptances.push(acceptance);

        let request = self
            .set_status(request_id, next_status)
            .ok_or(ServiceError::RequestNotFound(request_id))?;

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
        let _row = self.row_lock.lock().unwrap();
        let request = self
            .request(request_id)
            .ok_or(ServiceError::RequestNotFound(request_id))?;
        let mut acceptances = self.acceptances_for(request_id);

        let next_status = apply_donor_update(&request, &mut acceptances, donor_id, status)
            .map_err(|e| ServiceError::lifecycle(request_id, e))?;

        for entry in self.acceptances.lock().unwrap().iter_mut() {
            if entry.request_id == request_id && entry.donor_id == donor_id {
                entry.status = status;
            }
        }

        let request = self
            .set_status(request_id, next_status)
            .ok_or(ServiceError::RequestNotFound(request_id))?;

        Ok(RequestDetails {
            request,
            accepted_donors: acceptances,
        })
    }

    async fn cancel_request(&self, request_id: Uuid) -> Result<BloodRequest, ServiceError> {
        let _row = self.row_lock.lock().unwrap();
        let request = self
            .request(request_id)
            .ok_or(ServiceError::RequestNotFound(request_id))?;
        check_cancel(request.status).map_err(|e| ServiceError::lifecycle(request_id, e))?;

        self.set_status(request_id, RequestStatus::Cancelled)
            .ok_or(ServiceError::RequestNotFound(request_id))
    }

    async fn override_request_status(
        &self,
        request_id: Uuid,
        status: RequestStatus,
    ) -> Result<BloodRequest, ServiceError> {
        let _row = self.row_lock.lock().unwrap();
        let request = self
            .request(request_id)
            .ok_or(ServiceError::RequestNotFound(request_id))?;
        check_override(request.status, status)
            .map_err(|e| ServiceError::lifecycle(request_id, e))?;

        self.set_status(request_id, status)
            .ok_or(ServiceError::RequestNotFound(request_id))
    }
}

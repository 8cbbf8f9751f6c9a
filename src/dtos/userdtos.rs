use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::usermodel::{BloodGroup, ContactIdentifier, NewUser, User, UserRole},
    utils::geo::GeoPoint,
};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1-100 characters"))]
    pub name: String,

    /// Email address or phone number.
    #[validate(length(min = 1, message = "Email or phone number is required"))]
    pub identifier: String,

    pub role: UserRole,

    #[serde(rename = "bloodGroup")]
    pub blood_group: BloodGroup,

    #[validate(length(min = 1, max = 4096, message = "Push token must be between 1-4096 characters"))]
    #[serde(rename = "pushToken")]
    pub push_token: Option<String>,
}

impl RegisterUserDto {
    pub fn into_new_user(self) -> Result<NewUser, String> {
        let contact = ContactIdentifier::parse(&self.identifier)?;

        Ok(NewUser {
            name: self.name.trim().to_string(),
            contact,
            role: self.role,
            blood_group: self.blood_group,
            push_token: self.push_token,
        })
    }
}

/// Range checks and the (0,0) sentinel live in [`GeoPoint::new`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationDto {
    pub longitude: f64,
    pub latitude: f64,
}

impl LocationDto {
    pub fn to_point(&self) -> Result<GeoPoint, String> {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityDto {
    #[serde(rename = "isAvailable")]
    pub is_available: bool,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct PushTokenDto {
    /// `null` clears the stored token.
    #[validate(length(min = 1, max = 4096, message = "Push token must be between 1-4096 characters"))]
    #[serde(rename = "pushToken")]
    pub push_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDonationDto {
    #[serde(rename = "donatedAt")]
    pub donated_at: Option<DateTime<Utc>>,
}

impl RecordDonationDto {
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
        match self.donated_at {
            Some(at) if at > now => Err("Donation date cannot be in the future".to_string()),
            Some(at) => Ok(at),
            None => Ok(now),
        }
    }
}

/// Query string shared by the donor and request proximity searches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyQueryDto {
    pub longitude: f64,
    pub latitude: f64,

    #[serde(rename = "maxDistance")]
    pub max_distance: Option<f64>,

    #[serde(rename = "bloodGroup")]
    pub blood_group: Option<String>,
}

impl NearbyQueryDto {
    pub fn origin(&self) -> Result<GeoPoint, String> {
        GeoPoint::new(self.longitude, self.latitude)
    }

    pub fn blood_group(&self) -> Result<Option<BloodGroup>, String> {
        match self.blood_group.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<BloodGroup>().map(Some),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityDto {
    pub eligible: bool,
    #[serde(rename = "totalDonations")]
    pub total_donations: i32,
    #[serde(rename = "lastDonationDate")]
    pub last_donation_date: Option<DateTime<Utc>>,
    #[serde(rename = "nextEligibleDate")]
    pub next_eligible_date: Option<DateTime<Utc>>,
}

impl EligibilityDto {
    pub fn from_user(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            eligible: user.is_eligible_at(now),
            total_donations: user.total_donations,
            last_donation_date: user.last_donation_date,
            next_eligible_date: user.next_eligible_date(),
        }
    }
}

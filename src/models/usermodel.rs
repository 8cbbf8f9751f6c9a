//1
use chrono::{prelude::*, Duration};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::geo::GeoPoint;

/// Days a donor has to wait after a donation before donating again.
pub const ELIGIBILITY_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Donor,
    Requester,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::Donor => "donor",
            UserRole::Requester => "requester",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "blood_group")]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    #[sqlx(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    #[sqlx(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    #[sqlx(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    #[sqlx(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    #[sqlx(rename = "AB+")]
    ABPositive,
    #[serde(rename = "AB-")]
    #[sqlx(rename = "AB-")]
    ABNegative,
    #[serde(rename = "O+")]
    #[sqlx(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    #[sqlx(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    pub fn to_str(&self) -> &str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::ABPositive => "AB+",
            BloodGroup::ABNegative => "AB-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
        }
    }
}

impl std::str::FromStr for BloodGroup {
    type Err = String;

    // Query strings often arrive with '+' decoded as a space.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start().replace(' ', "+").to_uppercase().as_str() {
            "A+" => Ok(BloodGroup::APositive),
            "A-" => Ok(BloodGroup::ANegative),
            "B+" => Ok(BloodGroup::BPositive),
            "B-" => Ok(BloodGroup::BNegative),
            "AB+" => Ok(BloodGroup::ABPositive),
            "AB-" => Ok(BloodGroup::ABNegative),
            "O+" => Ok(BloodGroup::OPositive),
            "O-" => Ok(BloodGroup::ONegative),
            other => Err(format!("Unknown blood group: {}", other)),
        }
    }
}

/// How a user is reached for verification. Parsed once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "value", rename_all = "snake_case")]
pub enum ContactIdentifier {
    Email(String),
    Phone(String),
}

impl ContactIdentifier {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("Email or phone number is required".to_string());
        }

        if trimmed.contains('@') {
            let email_regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
                .map_err(|_| "Invalid email pattern".to_string())?;
            return if email_regex.is_match(trimmed) {
                Ok(ContactIdentifier::Email(trimmed.to_lowercase()))
            } else {
                Err("Email is invalid".to_string())
            };
        }

        let compact: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        let phone_regex = Regex::new(r"^\+?[0-9]{10,15}$")
            .map_err(|_| "Invalid phone pattern".to_string())?;
        if phone_regex.is_match(&compact) {
            Ok(ContactIdentifier::Phone(compact))
        } else {
            Err("Phone number must contain 10 to 15 digits".to_string())
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            ContactIdentifier::Email(email) => Some(email),
            ContactIdentifier::Phone(_) => None,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            ContactIdentifier::Phone(phone) => Some(phone),
            ContactIdentifier::Email(_) => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: uuid::Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub blood_group: BloodGroup,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub is_available: bool,

    #[serde(skip_serializing)]
    pub push_token: Option<String>,

    pub total_donations: i32,
    pub last_donation_date: Option<DateTime<Utc>>,

    #[serde(skip_serializing)]
    pub last_reminder_sent_at: Option<DateTime<Utc>>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_columns(self.longitude, self.latitude)
    }

    pub fn is_donor(&self) -> bool {
        self.role == UserRole::Donor
    }

    /// `None` when the donor has never donated.
    pub fn next_eligible_date(&self) -> Option<DateTime<Utc>> {
        self.last_donation_date
            .map(|last| last + Duration::days(ELIGIBILITY_WINDOW_DAYS))
    }

    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        match self.next_eligible_date() {
            Some(next) => now >= next,
            None => true,
        }
    }

    /// Eligible again and not yet reminded since the last donation.
    pub fn needs_eligibility_reminder(&self, now: DateTime<Utc>) -> bool {
        let Some(last_donation) = self.last_donation_date else {
            return false;
        };
        let reminded_since = self
            .last_reminder_sent_at
            .map(|reminded| reminded >= last_donation)
            .unwrap_or(false);

        self.is_donor()
            && self.is_available
            && self.push_token.is_some()
            && self.is_eligible_at(now)
            && !reminded_since
    }
}

/// Row written at registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub contact: ContactIdentifier,
    pub role: UserRole,
    pub blood_group: BloodGroup,
    pub push_token: Option<String>,
}

/// A donor returned by a proximity query together with its distance.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NearbyDonor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteUserOutcome {
    Deleted,
    NotFound,
    ActiveRequestExists,
}

#[cfg(test)]
pub fn sample_user(role: UserRole, blood_group: BloodGroup) -> User {
    let now = Utc::now();
    User {
        id: uuid::Uuid::new_v4(),
        name: "Test User".to_string(),
        email: Some(format!("{}@example.com", uuid::Uuid::new_v4())),
        phone: None,
        role,
        blood_group,
        longitude: None,
        latitude: None,
        is_available: role == UserRole::Donor,
        push_token: None,
        total_donations: 0,
        last_donation_date: None,
        last_reminder_sent_at: None,
        created_at: now,
        updated_at: now,
    }
}

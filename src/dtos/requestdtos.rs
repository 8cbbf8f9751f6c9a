use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{
        requestmodel::{AcceptanceStatus, NewBloodRequest, RequestStatus, Urgency},
        usermodel::BloodGroup,
    },
    utils::geo::GeoPoint,
};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestDto {
    #[serde(rename = "bloodGroup")]
    pub blood_group: BloodGroup,

    #[validate(range(min = 1, max = 10, message = "Units must be between 1 and 10"))]
    pub units: i32,

    #[validate(length(min = 1, max = 200, message = "Hospital name must be between 1-200 characters"))]
    #[serde(rename = "hospitalName")]
    pub hospital_name: String,

    #[validate(length(min = 1, max = 500, message = "Hospital address must be between 1-500 characters"))]
    #[serde(rename = "hospitalAddress")]
    pub hospital_address: String,

    pub longitude: f64,
    pub latitude: f64,

    pub urgency: Option<Urgency>,

    #[serde(rename = "requiredBy")]
    pub required_by: DateTime<Utc>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

impl CreateRequestDto {
    pub fn into_new_request(self) -> Result<NewBloodRequest, String> {
        let location = GeoPoint::new(self.longitude, self.latitude)?;

        Ok(NewBloodRequest {
            blood_group: self.blood_group,
            units: self.units,
            hospital_name: self.hospital_name.trim().to_string(),
            hospital_address: self.hospital_address.trim().to_string(),
            location,
            urgency: self.urgency.unwrap_or(Urgency::Medium),
            required_by: self.required_by,
            notes: self.notes,
        })
    }
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcceptRequestDto {
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonorStatusDto {
    pub status: AcceptanceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStatusDto {
    pub status: RequestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> serde_json::Value {
        serde_json::json!({
            "bloodGroup": "O+",
            "units": 2,
            "hospitalName": "City Hospital",
            "hospitalAddress": "1 MG Road",
            "longitude": 77.59,
            "latitude": 12.97,
            "urgency": "CRITICAL",
            "requiredBy": "2030-01-01T00:00:00Z"
        })
    }

    #[test]
    fn create_dto_maps_into_new_request() {
        let dto: CreateRequestDto = serde_json::from_value(body()).unwrap();
        assert!(dto.validate().is_ok());

        let request = dto.into_new_request().unwrap();
        assert_eq!(request.blood_group, BloodGroup::OPositive);
        assert_eq!(request.urgency, Urgency::Critical);
        assert_eq!(request.location, GeoPoint::new(77.59, 12.97).unwrap());
    }

    #[test]
    fn units_outside_range_fail_validation() {
        for units in [0, 11] {
            let mut value = body();
            value["units"] = serde_json::json!(units);
            let dto: CreateRequestDto = serde_json::from_value(value).unwrap();
            assert!(dto.validate().is_err());
        }
    }

    #[test]
    fn urgency_defaults_to_medium() {
        let mut value = body();
        value.as_object_mut().unwrap().remove("urgency");
        let dto: CreateRequestDto = serde_json::from_value(value).unwrap();
        assert_eq!(dto.into_new_request().unwrap().urgency, Urgency::Medium);
    }

    #[test]
    fn sentinel_location_is_rejected() {
        let mut value = body();
        value["longitude"] = serde_json::json!(0.0);
        value["latitude"] = serde_json::json!(0.0);
        let dto: CreateRequestDto = serde_json::from_value(value).unwrap();
        assert!(dto.into_new_request().is_err());
    }

    #[test]
    fn status_bodies_use_upper_case_names() {
        let donor: DonorStatusDto = serde_json::from_str(r#"{"status":"CONFIRMED"}"#).unwrap();
        assert_eq!(donor.status, AcceptanceStatus::Confirmed);

        let admin: AdminStatusDto = serde_json::from_str(r#"{"status":"IN_PROGRESS"}"#).unwrap();
        assert_eq!(admin.status, RequestStatus::InProgress);
    }
}

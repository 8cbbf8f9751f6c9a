use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::to_string(&self).map_err(|_| fmt::Error)?)
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorMessage {
    TokenNotProvided,
    InvalidToken,
    UserNoLongerExist,
    UserNotAuthenticated,
    PermissionDenied,
    AdminKeyMissing,
    TooManyRequests,
    LocationUnavailable,
    ServerError,
}

impl ToString for ErrorMessage {
    fn to_string(&self) -> String {
        self.to_str().to_owned()
    }
}

impl ErrorMessage {
    fn to_str(&self) -> &'static str {
        match self {
            ErrorMessage::TokenNotProvided => "You are not logged in, please provide a token",
            ErrorMessage::InvalidToken => "Authentication token is invalid or expired",
            ErrorMessage::UserNoLongerExist => "User belonging to this token no longer exists",
            ErrorMessage::UserNotAuthenticated => "Authentication required. Please log in.",
            ErrorMessage::PermissionDenied => "You are not allowed to perform this action",
            ErrorMessage::AdminKeyMissing => "A valid admin key is required",
            ErrorMessage::TooManyRequests => "Too many requests, slow down",
            ErrorMessage::LocationUnavailable => "Location not available. Please enable location services",
            ErrorMessage::ServerError => "Server Error. Please try again later",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpError {
    pub error: String,
    pub message: String,
    pub status: StatusCode,
}

impl HttpError {
    pub fn new(error: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        HttpError {
            error: error.into(),
            message: message.into(),
            status,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        HttpError::new("server_error", message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError::new("bad_input", message, StatusCode::BAD_REQUEST)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HttpError::new("not_found", message, StatusCode::NOT_FOUND)
    }

    pub fn conflict(error: impl Into<String>, message: impl Into<String>) -> Self {
        HttpError::new(error, message, StatusCode::CONFLICT)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        HttpError::new("unauthorized", message, StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        HttpError::new("forbidden", message, StatusCode::FORBIDDEN)
    }

    pub fn too_many_requests() -> Self {
        HttpError::new(
            "rate_limited",
            ErrorMessage::TooManyRequests.to_string(),
            StatusCode::TOO_MANY_REQUESTS,
        )
    }

    pub fn into_http_response(self) -> Response {
        let json_response = Json(ErrorResponse {
            error: self.error,
            message: Some(self.message),
        });

        (self.status, json_response).into_response()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpError: error: {}, message: {}, status: {}",
            self.error, self.message, self.status
        )
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_kind_and_message() {
        let err = HttpError::conflict("capacity_exceeded", "Request is already full");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn error_response_skips_missing_message() {
        let body = ErrorResponse { error: "not_found".to_string(), message: None };
        assert_eq!(body.to_string(), r#"{"error":"not_found"}"#);
    }
}

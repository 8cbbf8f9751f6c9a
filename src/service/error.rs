use thiserror::Error;
use uuid::Uuid;
use crate::{
    error::HttpError,
    models::requestmodel::{LifecycleError, RequestStatus},
    service::notification_service::NotificationError,
};
use axum::http::StatusCode;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    BadInput(String),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Blood request {0} not found")]
    RequestNotFound(Uuid),

    #[error("Donor {donor_id} has not accepted request {request_id}")]
    DonorNotFound { request_id: Uuid, donor_id: Uuid },

    #[error("Donor {donor_id} has already accepted request {request_id}")]
    DuplicateAcceptance { request_id: Uuid, donor_id: Uuid },

    #[error("Request {request_id} already has {units} accepted donor(s)")]
    CapacityExceeded { request_id: Uuid, units: i32 },

    #[error("Cannot {action} request {request_id} while it is {from:?}")]
    InvalidTransition { request_id: Uuid, from: RequestStatus, action: &'static str },

    #[error("{0}")]
    Forbidden(String),

    #[error("User {0} still has an active blood request")]
    ActiveRequestExists(Uuid),

    #[error("Notification backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl ServiceError {
    /// Attaches the request id to a lifecycle guard failure.
    pub fn lifecycle(request_id: Uuid, error: LifecycleError) -> Self {
        match error {
            LifecycleError::DuplicateAcceptance(donor_id) => {
                ServiceError::DuplicateAcceptance { request_id, donor_id }
            }
            LifecycleError::CapacityExceeded { units } => {
                ServiceError::CapacityExceeded { request_id, units }
            }
            LifecycleError::DonorNotFound(donor_id) => {
                ServiceError::DonorNotFound { request_id, donor_id }
            }
            LifecycleError::InvalidTransition { from, action } => {
                ServiceError::InvalidTransition { request_id, from, action }
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::BadInput(_) => "bad_input",
            ServiceError::UserNotFound(_)
            | ServiceError::RequestNotFound(_)
            | ServiceError::DonorNotFound { .. } => "not_found",
            ServiceError::DuplicateAcceptance { .. } => "duplicate_acceptance",
            ServiceError::CapacityExceeded { .. } => "capacity_exceeded",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::ActiveRequestExists(_) => "active_request_exists",
            ServiceError::BackendUnavailable(_) => "backend_unavailable",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Database(_) | ServiceError::Other(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadInput(_) => StatusCode::BAD_REQUEST,

            ServiceError::UserNotFound(_)
            | ServiceError::RequestNotFound(_)
            | ServiceError::DonorNotFound { .. } => StatusCode::NOT_FOUND,

            ServiceError::DuplicateAcceptance { .. }
            | ServiceError::CapacityExceeded { .. }
            | ServiceError::InvalidTransition { .. }
            | ServiceError::ActiveRequestExists(_) => StatusCode::CONFLICT,

            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,

            ServiceError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,

            ServiceError::Database(_) | ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", error);
        }

        // Database details stay in the logs.
        let message = match &error {
            ServiceError::Database(_) | ServiceError::Other(_) => {
                crate::error::ErrorMessage::ServerError.to_string()
            }
            other => other.to_string(),
        };

        HttpError::new(error.kind(), message, status)
    }
}

impl From<NotificationError> for ServiceError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::BackendUnavailable => {
                ServiceError::BackendUnavailable("push notifications are not configured".to_string())
            }
            other => ServiceError::Other(other.to_string()),
        }
    }
}

impl From<String> for ServiceError {
    fn from(err: String) -> Self {
        ServiceError::Other(err)
    }
}

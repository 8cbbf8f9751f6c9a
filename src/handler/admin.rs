use std::sync::Arc;

use axum::{middleware, response::IntoResponse, routing::put, Extension, Json, Router};
use uuid::Uuid;

use crate::{
    dtos::{requestdtos::AdminStatusDto, ApiResponse},
    error::HttpError,
    middleware::admin_guard,
    utils::extract::{ApiJson, ApiPath},
    AppState,
};

pub fn admin_handler() -> Router {
    Router::new()
        .route("/requests/:request_id/status", put(set_request_status))
        .layer(middleware::from_fn(admin_guard))
}

pub async fn set_request_status(
    Extension(app_state): Extension<Arc<AppState>>,
    ApiPath(request_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<AdminStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state
        .request_service
        .admin_set_status(request_id, body.status)
        .await?;

    Ok(Json(ApiResponse::success("Request status updated", request)))
}

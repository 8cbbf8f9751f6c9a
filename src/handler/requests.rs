use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        requestdtos::{AcceptRequestDto, CreateRequestDto, DonorStatusDto},
        userdtos::NearbyQueryDto,
        ApiResponse,
    },
    error::HttpError,
    middleware::{auth, rate_limit, role_check, JWTAuthMiddeware, RateLimitScope},
    models::usermodel::UserRole,
    utils::extract::{ApiJson, ApiPath, ApiQuery},
    AppState,
};

pub fn requests_handler() -> Router {
    Router::new()
        .route(
            "/",
            get(list_nearby_requests)
                .layer(middleware::from_fn(|state, req, next| {
                    role_check(state, req, next, vec![UserRole::Donor])
                }))
                .merge(
                    post(create_request)
                        .layer(middleware::from_fn(|state, req, next| {
                            rate_limit(state, req, next, RateLimitScope::CreateRequest)
                        }))
                        .layer(middleware::from_fn(|state, req, next| {
                            role_check(state, req, next, vec![UserRole::Requester])
                        })),
                ),
        )
        .route(
            "/mine",
            get(get_my_requests).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Requester])
            })),
        )
        .route("/:request_id", get(get_request))
        .route(
            "/:request_id/accept",
            post(accept_request)
                .layer(middleware::from_fn(|state, req, next| {
                    rate_limit(state, req, next, RateLimitScope::AcceptRequest)
                }))
                .layer(middleware::from_fn(|state, req, next| {
                    role_check(state, req, next, vec![UserRole::Donor])
                })),
        )
        .route(
            "/:request_id/donors/:donor_id/status",
            put(update_donor_status),
        )
        .route(
            "/:request_id/cancel",
            post(cancel_request).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Requester])
            })),
        )
        .layer(middleware::from_fn(auth))
}

pub async fn list_nearby_requests(
    Extension(app_state): Extension<Arc<AppState>>,
    ApiQuery(query): ApiQuery<NearbyQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let origin = query.origin().map_err(HttpError::bad_request)?;
    let blood_group = query.blood_group().map_err(HttpError::bad_request)?;

    let requests = app_state
        .matching_service
        .nearby_requests(origin, query.max_distance, blood_group)
        .await?;

    Ok(Json(ApiResponse::success(
        &format!("Found {} open request(s)", requests.len()),
        requests,
    )))
}

pub async fn create_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    ApiJson(body): ApiJson<CreateRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let new_request = body.into_new_request().map_err(HttpError::bad_request)?;

    let created = app_state
        .request_service
        .create_request(&auth.user, new_request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Blood request created", created)),
    ))
}

pub async fn get_my_requests(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let requests = app_state
        .request_service
        .requests_for_requester(&auth.user)
        .await?;

    Ok(Json(ApiResponse::success("Requests retrieved", requests)))
}

pub async fn get_request(
    Extension(app_state): Extension<Arc<AppState>>,
    ApiPath(request_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let details = app_state.request_service.load_request(request_id).await?;

    Ok(Json(ApiResponse::success("Request retrieved", details)))
}

pub async fn accept_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    ApiPath(request_id): ApiPath<Uuid>,
    body: Option<ApiJson<AcceptRequestDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|ApiJson(body)| body).unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let details = app_state
        .request_service
        .accept(request_id, &auth.user, body.notes)
        .await?;

    Ok(Json(ApiResponse::success("Request accepted", details)))
}

pub async fn update_donor_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    ApiPath((request_id, donor_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(body): ApiJson<DonorStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    let details = app_state
        .request_service
        .update_donor_status(request_id, &auth.user, donor_id, body.status)
        .await?;

    Ok(Json(ApiResponse::success("Donor status updated", details)))
}

pub async fn cancel_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    ApiPath(request_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state
        .request_service
        .cancel(request_id, &auth.user)
        .await?;

    Ok(Json(ApiResponse::success("Request cancelled", request)))
}

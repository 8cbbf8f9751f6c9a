use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    dtos::{
        userdtos::{
            AvailabilityDto, EligibilityDto, LocationDto, NearbyQueryDto, PushTokenDto,
            RecordDonationDto, RegisterUserDto,
        },
        ApiResponse,
    },
    error::HttpError,
    middleware::{auth, role_check, JWTAuthMiddeware},
    models::usermodel::{DeleteUserOutcome, UserRole},
    service::error::ServiceError,
    utils::extract::{ApiJson, ApiQuery},
    AppState,
};

pub fn users_handler() -> Router {
    let protected = Router::new()
        .route("/me", get(get_me).delete(delete_me))
        .route("/me/location", put(update_location))
        .route("/me/push-token", put(update_push_token))
        .route(
            "/me/availability",
            put(update_availability).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Donor])
            })),
        )
        .route(
            "/me/donations",
            post(record_donation).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Donor])
            })),
        )
        .route(
            "/me/eligibility",
            get(get_eligibility).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Donor])
            })),
        )
        .route(
            "/donors/nearby",
            get(find_nearby_donors).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Requester])
            })),
        )
        .layer(middleware::from_fn(auth));

    Router::new()
        .route("/register", post(register_user))
        .merge(protected)
}

pub async fn register_user(
    Extension(app_state): Extension<Arc<AppState>>,
    ApiJson(body): ApiJson<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let new_user = body.into_new_user().map_err(HttpError::bad_request)?;

    let user = app_state
        .db_client
        .save_user(new_user)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .map_or(false, |db_err| db_err.is_unique_violation());
            if duplicate {
                HttpError::bad_request("An account with this email or phone number already exists")
            } else {
                HttpError::from(ServiceError::from(e))
            }
        })?;

    tracing::info!("Registered {} {}", user.role.to_str(), user.id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Registration successful", user)),
    ))
}

pub async fn get_me(
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(ApiResponse::success("Profile retrieved", auth.user)))
}

pub async fn update_location(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    ApiJson(body): ApiJson<LocationDto>,
) -> Result<impl IntoResponse, HttpError> {
    let location = body.to_point().map_err(HttpError::bad_request)?;

    let user = app_state
        .db_client
        .update_user_location(auth.user.id, location)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success("Location updated", user)))
}

pub async fn update_availability(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    ApiJson(body): ApiJson<AvailabilityDto>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .update_user_availability(auth.user.id, body.is_available)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success("Availability updated", user)))
}

pub async fn update_push_token(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    ApiJson(body): ApiJson<PushTokenDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user = app_state
        .db_client
        .update_push_token(auth.user.id, body.push_token)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success("Push token updated", user)))
}

pub async fn record_donation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    body: Option<ApiJson<RecordDonationDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|ApiJson(body)| body).unwrap_or_default();
    let donated_at = body.resolve(Utc::now()).map_err(HttpError::bad_request)?;

    let user = app_state
        .db_client
        .record_donation(auth.user.id, donated_at)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    tracing::info!("Donor {} recorded donation #{}", user.id, user.total_donations);

    Ok(Json(ApiResponse::success(
        "Donation recorded",
        EligibilityDto::from_user(&user, Utc::now()),
    )))
}

pub async fn get_eligibility(
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(ApiResponse::success(
        "Eligibility retrieved",
        EligibilityDto::from_user(&auth.user, Utc::now()),
    )))
}

pub async fn delete_me(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let outcome = app_state
        .db_client
        .delete_user(auth.user.id)
        .await
        .map_err(ServiceError::from)?;

    match outcome {
        DeleteUserOutcome::Deleted => {
            tracing::info!("User {} deleted their account", auth.user.id);
            Ok(Json(ApiResponse::success("Account deleted", auth.user.id)))
        }
        DeleteUserOutcome::NotFound => Err(ServiceError::UserNotFound(auth.user.id).into()),
        DeleteUserOutcome::ActiveRequestExists => {
            Err(ServiceError::ActiveRequestExists(auth.user.id).into())
        }
    }
}

pub async fn find_nearby_donors(
    Extension(app_state): Extension<Arc<AppState>>,
    ApiQuery(query): ApiQuery<NearbyQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let origin = query.origin().map_err(HttpError::bad_request)?;
    let blood_group = query.blood_group().map_err(HttpError::bad_request)?;

    let donors = app_state
        .matching_service
        .nearby_donors(origin, query.max_distance, blood_group)
        .await?;

    Ok(Json(ApiResponse::success(
        &format!("Found {} nearby donor(s)", donors.len()),
        donors,
    )))
}

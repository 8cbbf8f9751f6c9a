use std::sync::Arc;

use axum::{routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{admin::admin_handler, requests::requests_handler, users::users_handler},
    AppState,
};

// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .nest("/users", users_handler())
        .nest("/requests", requests_handler())
        .nest("/admin", admin_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::Config,
        db::memory::MemoryStore,
        models::usermodel::{sample_user, BloodGroup, User, UserRole},
        service::notification_service::{testing::FakePushBackend, PushBackend},
        utils::token::create_token,
    };

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
    }

    fn test_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let backend: Arc<dyn PushBackend> = Arc::new(FakePushBackend::default());
        let state = AppState::new(store.clone(), Config::for_tests(), Some(backend));
        TestApp {
            router: create_router(Arc::new(state)),
            store,
        }
    }

    fn bearer(user: &User) -> String {
        format!("Bearer {}", create_token(&user.id.to_string(), b"test-secret", 3600))
    }

    fn json_request(method: Method, uri: &str, auth: Option<&User>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(user) = auth {
            builder = builder.header(header::AUTHORIZATION, bearer(user));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_body() -> Value {
        json!({
            "bloodGroup": "O+",
            "units": 2,
            "hospitalName": "City Hospital",
            "hospitalAddress": "1 MG Road",
            "longitude": 77.59,
            "latitude": 12.97,
            "urgency": "HIGH",
            "requiredBy": (Utc::now() + Duration::hours(6)).to_rfc3339()
        })
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = test_app();
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = test_app();
        let response = app
            .router
            .oneshot(Request::get("/api/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn tokens_for_deleted_users_are_rejected() {
        let app = test_app();
        let ghost = sample_user(UserRole::Donor, BloodGroup::APositive);

        let response = app
            .router
            .oneshot(json_request(Method::GET, "/api/users/me", Some(&ghost), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_then_read_profile() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/users/register",
                None,
                json!({
                    "name": "Meera",
                    "identifier": "meera@example.com",
                    "role": "DONOR",
                    "bloodGroup": "B+",
                    "pushToken": "meera-phone"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert!(body["data"].get("push_token").is_none());
        let id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

        let user = app.store.user(id).unwrap();
        let response = app
            .router
            .oneshot(json_request(Method::GET, "/api/users/me", Some(&user), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["email"], "meera@example.com");
    }

    #[tokio::test]
    async fn register_rejects_unparseable_identifier() {
        let app = test_app();
        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/users/register",
                None,
                json!({
                    "name": "Meera",
                    "identifier": "call me maybe",
                    "role": "DONOR",
                    "bloodGroup": "B+"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn roles_gate_request_routes() {
        let app = test_app();
        let donor = app.store.insert_user(sample_user(UserRole::Donor, BloodGroup::OPositive));

        let response = app
            .router
            .oneshot(json_request(Method::POST, "/api/requests", Some(&donor), create_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_accept_and_duplicate_over_http() {
        let app = test_app();
        let requester = app
            .store
            .insert_user(sample_user(UserRole::Requester, BloodGroup::OPositive));
        let donor = app.store.insert_user(sample_user(UserRole::Donor, BloodGroup::OPositive));

        let response = app
            .router
            .clone()
            .oneshot(json_request(Method::POST, "/api/requests", Some(&requester), create_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["request"]["status"], "PENDING");
        assert_eq!(body["data"]["notifications"]["backend_available"], true);
        let request_id = body["data"]["request"]["id"].as_str().unwrap().to_string();

        let accept_uri = format!("/api/requests/{}/accept", request_id);
        let response = app
            .router
            .clone()
            .oneshot(json_request(Method::POST, &accept_uri, Some(&donor), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "IN_PROGRESS");

        let response = app
            .router
            .clone()
            .oneshot(json_request(Method::POST, &accept_uri, Some(&donor), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "duplicate_acceptance");

        let response = app
            .router
            .oneshot(json_request(
                Method::GET,
                &format!("/api/requests/{}", request_id),
                Some(&donor),
                Value::Null,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["accepted_donors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sentinel_location_is_a_bad_request() {
        let app = test_app();
        let requester = app
            .store
            .insert_user(sample_user(UserRole::Requester, BloodGroup::OPositive));

        let response = app
            .router
            .oneshot(json_request(
                Method::GET,
                "/api/users/donors/nearby?longitude=0&latitude=0",
                Some(&requester),
                Value::Null,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            "Location not available. Please enable location services"
        );
    }

    #[tokio::test]
    async fn malformed_input_uses_the_error_body() {
        let app = test_app();
        let donor = app.store.insert_user(sample_user(UserRole::Donor, BloodGroup::OPositive));
        let requester = app
            .store
            .insert_user(sample_user(UserRole::Requester, BloodGroup::OPositive));

        let missing_coordinates = app
            .router
            .clone()
            .oneshot(json_request(
                Method::GET,
                "/api/requests?maxDistance=5000",
                Some(&donor),
                Value::Null,
            ))
            .await
            .unwrap();

        let bad_body = app
            .router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/requests",
                Some(&requester),
                json!({"bloodGroup": "O+"}),
            ))
            .await
            .unwrap();

        let bad_id = app
            .router
            .oneshot(json_request(
                Method::GET,
                "/api/requests/not-a-uuid",
                Some(&donor),
                Value::Null,
            ))
            .await
            .unwrap();

        for response in [missing_coordinates, bad_body, bad_id] {
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json"
            );
            let body = body_json(response).await;
            assert_eq!(body["error"], "bad_input");
            assert!(body["message"].is_string());
        }
    }

    #[tokio::test]
    async fn request_creation_is_rate_limited() {
        let app = test_app();
        let requester = app
            .store
            .insert_user(sample_user(UserRole::Requester, BloodGroup::OPositive));

        for _ in 0..10 {
            let response = app
                .router
                .clone()
                .oneshot(json_request(Method::POST, "/api/requests", Some(&requester), json!({})))
                .await
                .unwrap();
            assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }

        let response = app
            .router
            .oneshot(json_request(Method::POST, "/api/requests", Some(&requester), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn admin_routes_need_the_shared_key() {
        let app = test_app();
        let request = app.store.insert_request(crate::models::requestmodel::sample_request(
            1,
            crate::models::requestmodel::RequestStatus::Pending,
        ));
        let uri = format!("/api/admin/requests/{}/status", request.id);

        let response = app
            .router
            .clone()
            .oneshot(json_request(Method::PUT, &uri, None, json!({"status": "CANCELLED"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut wrong_key = json_request(Method::PUT, &uri, None, json!({"status": "CANCELLED"}));
        wrong_key
            .headers_mut()
            .insert("x-admin-key", "admin-secreT".parse().unwrap());
        let response = app.router.clone().oneshot(wrong_key).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut with_key = json_request(Method::PUT, &uri, None, json!({"status": "CANCELLED"}));
        with_key
            .headers_mut()
            .insert("x-admin-key", "admin-secret".parse().unwrap());
        let response = app.router.oneshot(with_key).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "CANCELLED");
    }

    #[tokio::test]
    async fn account_deletion_is_blocked_by_active_requests() {
        let app = test_app();
        let requester = app
            .store
            .insert_user(sample_user(UserRole::Requester, BloodGroup::OPositive));
        let mut request = crate::models::requestmodel::sample_request(
            1,
            crate::models::requestmodel::RequestStatus::InProgress,
        );
        request.requester_id = requester.id;
        app.store.insert_request(request);

        let response = app
            .router
            .oneshot(json_request(Method::DELETE, "/api/users/me", Some(&requester), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(app.store.user(requester.id).is_some());
    }
}

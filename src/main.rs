mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::{sync::Arc, time::Duration};

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use db::{db::DBClient, Store};
use dotenv::dotenv;
use middleware::RateLimits;
use routes::create_router;
use service::{
    background_jobs,
    matching_service::MatchingService,
    notification_service::{FcmBackend, NotificationService, PushBackend},
    request_service::RequestService,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn Store>,
    pub matching_service: Arc<MatchingService>,
    pub notification_service: Arc<NotificationService>,
    pub request_service: Arc<RequestService>,
    pub rate_limits: RateLimits,
}

impl AppState {
    pub fn new(
        db_client: Arc<dyn Store>,
        config: Config,
        push_backend: Option<Arc<dyn PushBackend>>,
    ) -> Self {
        let matching_service = MatchingService::new(db_client.clone(), config.default_search_radius_m);
        let notification_service = NotificationService::new(push_backend);
        let request_service = RequestService::new(
            db_client.clone(),
            matching_service.clone(),
            notification_service.clone(),
        );

        AppState {
            env: config,
            db_client,
            matching_service: Arc::new(matching_service),
            notification_service: Arc::new(notification_service),
            request_service: Arc::new(request_service),
            rate_limits: RateLimits::default(),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    let level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::DEBUG);
    tracing_subscriber::fmt().with_max_level(level).init();

    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("✅ Connection to the database is successful!");
            pool
        }
        Err(err) => {
            tracing::error!("🔥 Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);

    let monitor = db_client.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let (size, idle) = monitor.pool_status();
            tracing::debug!("DB pool: {} connections, {} idle", size, idle);
        }
    });

    let push_backend = FcmBackend::from_config(&config).map(|b| Arc::new(b) as Arc<dyn PushBackend>);
    if !config.push_configured() {
        tracing::warn!("FCM_PROJECT_ID/FCM_ACCESS_TOKEN not set, push notifications are disabled");
    }

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = Arc::new(AppState::new(Arc::new(db_client), config.clone(), push_backend));
    tracing::info!(
        "Push notifications available: {}",
        app_state.notification_service.is_available()
    );

    tokio::spawn(background_jobs::start_expiry_sweep_job(app_state.clone()));
    tokio::spawn(background_jobs::start_eligibility_reminder_job(app_state.clone()));

    let app = create_router(app_state).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("🔥 Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server stopped: {}", err);
    }
}

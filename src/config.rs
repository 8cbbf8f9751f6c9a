// config.rs
use crate::utils::geo::validate_radius;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub log_level: String,
    pub allowed_origins: Vec<String>,
    // Admin override routes are disabled when no key is configured
    pub admin_api_key: Option<String>,
    // Push delivery (FCM HTTP v1)
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<String>,
    // Matching and background jobs
    pub default_search_radius_m: f64,
    pub expiry_sweep_interval_secs: u64,
    pub reminder_interval_secs: u64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://localhost:8000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let admin_api_key = non_empty_var("ADMIN_API_KEY");
        let fcm_project_id = non_empty_var("FCM_PROJECT_ID");
        let fcm_access_token = non_empty_var("FCM_ACCESS_TOKEN");

        let default_search_radius_m =
            parse_search_radius(std::env::var("DEFAULT_SEARCH_RADIUS_M").ok())
                .unwrap_or_else(|e| panic!("Invalid DEFAULT_SEARCH_RADIUS_M: {}", e));
        let expiry_sweep_interval_secs = std::env::var("EXPIRY_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(900);
        let reminder_interval_secs = std::env::var("REMINDER_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(86_400);

        Config {
            database_url,
            jwt_secret,
            port,
            log_level,
            allowed_origins,
            admin_api_key,
            fcm_project_id,
            fcm_access_token,
            default_search_radius_m,
            expiry_sweep_interval_secs,
            reminder_interval_secs,
        }
    }

    /// Both FCM settings are needed before push delivery is attempted.
    pub fn push_configured(&self) -> bool {
        self.fcm_project_id.is_some() && self.fcm_access_token.is_some()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Unset means 20 km; anything else must be a radius the matcher accepts.
fn parse_search_radius(raw: Option<String>) -> Result<f64, String> {
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return Ok(20_000.0);
    };
    let radius = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    validate_radius(radius)
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Config {
        Config {
            database_url: "postgres://localhost/bloodlink_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            port: 0,
            log_level: "debug".to_string(),
            allowed_origins: vec![],
            admin_api_key: Some("admin-secret".to_string()),
            fcm_project_id: None,
            fcm_access_token: None,
            default_search_radius_m: 20_000.0,
            expiry_sweep_interval_secs: 900,
            reminder_interval_secs: 86_400,
        }
    }
}

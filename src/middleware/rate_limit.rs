// Rate limiting middleware for request creation and acceptance
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{extract::Request, middleware::Next, response::Response, Extension};

use crate::{error::HttpError, middleware::JWTAuthMiddeware, AppState};

// Simple in-memory sliding window, per process
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        let mut requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        let entry = requests.entry(key.to_string()).or_default();

        // Remove old requests outside the window
        entry.retain(|&timestamp| now.duration_since(timestamp) < self.window);

        if entry.len() < self.max_requests {
            entry.push(now);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimits {
    pub create_request: RateLimiter,
    pub accept_request: RateLimiter,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            create_request: create_request_rate_limiter(),
            accept_request: accept_request_rate_limiter(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RateLimitScope {
    CreateRequest,
    AcceptRequest,
}

pub async fn rate_limit(
    Extension(app_state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
    scope: RateLimitScope,
) -> Result<Response, HttpError> {
    let limiter = match scope {
        RateLimitScope::CreateRequest => &app_state.rate_limits.create_request,
        RateLimitScope::AcceptRequest => &app_state.rate_limits.accept_request,
    };

    let client_id = get_client_id(&request);

    if !limiter.is_allowed(&client_id) {
        tracing::warn!("Rate limit hit for {} on {:?}", client_id, scope);
        return Err(HttpError::too_many_requests());
    }

    Ok(next.run(request).await)
}

fn get_client_id(request: &Request) -> String {
    // Authenticated callers are keyed by user id
    if let Some(auth) = request.extensions().get::<JWTAuthMiddeware>() {
        return format!("user:{}", auth.user.id);
    }

    // Fallback to IP address
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "unknown".to_string())
}

// Rate limiting configurations
pub fn create_request_rate_limiter() -> RateLimiter {
    RateLimiter::new(10, Duration::from_secs(60)) // 10 new requests per minute
}

pub fn accept_request_rate_limiter() -> RateLimiter {
    RateLimiter::new(30, Duration::from_secs(60)) // 30 accepts per minute
}

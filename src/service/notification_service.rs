// services/notification_service.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

/// Concurrent deliveries per fan-out.
const FANOUT_CONCURRENCY: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Push notification backend is not configured")]
    BackendUnavailable,

    #[error("Push delivery failed: {0}")]
    Network(String),

    #[error("Push rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Push token is no longer registered")]
    Unregistered,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct PushRecipient {
    pub id: Uuid,
    pub push_token: Option<String>,
}

impl PushRecipient {
    pub fn new(id: Uuid, push_token: Option<String>) -> Self {
        Self { id, push_token }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// Recipients the backend accepted a message for.
    #[serde(skip)]
    pub delivered: Vec<Uuid>,
    /// Recipients whose token the backend reported as unregistered.
    #[serde(skip)]
    pub stale_recipients: Vec<Uuid>,
}

#[async_trait]
pub trait PushBackend: Send + Sync + std::fmt::Debug {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), NotificationError>;
}

/// Firebase Cloud Messaging over the HTTP v1 API.
#[derive(Debug, Clone)]
pub struct FcmBackend {
    client: reqwest::Client,
    project_id: String,
    access_token: String,
}

impl FcmBackend {
    pub fn new(project_id: String, access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            project_id,
            access_token,
        }
    }

    /// `None` unless both FCM settings are present.
    pub fn from_config(config: &Config) -> Option<Self> {
        match (&config.fcm_project_id, &config.fcm_access_token) {
            (Some(project_id), Some(access_token)) => {
                Some(Self::new(project_id.clone(), access_token.clone()))
            }
            _ => None,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        )
    }
}

#[async_trait]
impl PushBackend for FcmBackend {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "message": {
                "token": token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
            }
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND || body.contains("UNREGISTERED") {
            return Err(NotificationError::Unregistered);
        }

        Err(NotificationError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NotificationService {
    backend: Option<Arc<dyn PushBackend>>,
}

impl NotificationService {
    pub fn new(backend: Option<Arc<dyn PushBackend>>) -> Self {
        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Sends `message` to every recipient. Recipients without a push token are
    /// skipped and counted as failures.
    pub async fn notify_many(
        &self,
        recipients: &[PushRecipient],
        message: &PushMessage,
    ) -> Result<DispatchReport, NotificationError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or(NotificationError::BackendUnavailable)?;

        let mut report = DispatchReport::default();

        let deliverable: Vec<(Uuid, String)> = recipients
            .iter()
            .filter_map(|r| match r.push_token.as_deref() {
                Some(token) if !token.is_empty() => Some((r.id, token.to_string())),
                _ => {
                    report.failure_count += 1;
                    None
                }
            })
            .collect();

        let outcomes: Vec<(Uuid, Result<(), NotificationError>)> = stream::iter(deliverable)
            .map(|(id, token)| async move { (id, backend.send(&token, message).await) })
            .buffer_unordered(FANOUT_CONCURRENCY)
            .collect()
            .await;

        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    report.success_count += 1;
                    report.delivered.push(id);
                }
                Err(NotificationError::Unregistered) => {
                    report.failure_count += 1;
                    report.stale_recipients.push(id);
                }
                Err(e) => {
                    tracing::warn!("Push to user {} failed: {}", id, e);
                    report.failure_count += 1;
                }
            }
        }

        tracing::info!(
            "Push fan-out '{}': {} delivered, {} failed",
            message.title,
            report.success_count,
            report.failure_count
        );

        Ok(report)
    }

    pub async fn notify_one(&self, recipient: &PushRecipient, message: &PushMessage) -> bool {
        match self.notify_many(std::slice::from_ref(recipient), message).await {
            Ok(report) => report.success_count == 1,
            Err(e) => {
                tracing::debug!("Skipping push to user {}: {}", recipient.id, e);
                false
            }
        }
    }
}

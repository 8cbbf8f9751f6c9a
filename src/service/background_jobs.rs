// service/background_jobs.rs
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::{interval, Duration};

use crate::{
    db::Store,
    models::usermodel::ELIGIBILITY_WINDOW_DAYS,
    service::{
        error::ServiceError,
        notification_service::{NotificationService, PushMessage, PushRecipient},
    },
    AppState,
};

/// Start background job that expires pending requests past their deadline
pub async fn start_expiry_sweep_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.expiry_sweep_interval_secs));

    loop {
        interval.tick().await;

        tracing::info!("Running request expiry sweep at {}", Utc::now());

        match app_state.request_service.sweep_expired().await {
            Ok(count) => tracing::info!("Expiry sweep completed: {} request(s) expired", count),
            Err(e) => tracing::error!("Expiry sweep failed: {}", e),
        }
    }
}

/// Start background job that tells donors when they can give blood again
pub async fn start_eligibility_reminder_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.reminder_interval_secs));
    let store: Arc<dyn Store> = app_state.db_client.clone();

    loop {
        interval.tick().await;

        tracing::info!("Running eligibility reminder job at {}", Utc::now());

        match send_eligibility_reminders(store.as_ref(), &app_state.notification_service, Utc::now()).await {
            Ok(count) => tracing::info!("Eligibility reminders sent to {} donor(s)", count),
            Err(e) => tracing::error!("Eligibility reminder job failed: {}", e),
        }
    }
}

/// Pushes a reminder to every donor whose waiting period ended and stamps
/// them so the next run skips them. Returns how many donors were stamped.
pub async fn send_eligibility_reminders(
    store: &dyn Store,
    notifications: &NotificationService,
    now: DateTime<Utc>,
) -> Result<u64, ServiceError> {
    let donated_before = now - ChronoDuration::days(ELIGIBILITY_WINDOW_DAYS);

    let donors: Vec<_> = store
        .get_donors_due_for_reminder(donated_before)
        .await?
        .into_iter()
        .filter(|d| d.needs_eligibility_reminder(now))
        .collect();

    if donors.is_empty() {
        return Ok(0);
    }

    let recipients: Vec<PushRecipient> = donors
        .iter()
        .map(|d| PushRecipient::new(d.id, d.push_token.clone()))
        .collect();

    let message = PushMessage::new(
        "You can donate again",
        format!(
            "It has been {} days since your last donation. Someone nearby may need you.",
            ELIGIBILITY_WINDOW_DAYS
        ),
    );

    let report = notifications.notify_many(&recipients, &message).await?;

    if !report.stale_recipients.is_empty() {
        store.clear_push_tokens(&report.stale_recipients).await?;
    }

    if report.delivered.is_empty() {
        return Ok(0);
    }

    Ok(store.mark_reminded(&report.delivered, now).await?)
}

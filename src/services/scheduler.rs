//! Daily wall-clock trigger for the ingest pipeline.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::services::ingest;
use crate::AppState;

/// Next occurrence of `at` (UTC) strictly after `now`.
pub fn next_run(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Fire the configured city's ingest once a day until shutdown.
pub async fn run_daily(state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let at = state.config.scheduler.daily_at;
    let city = state.config.scheduler.city.clone();

    loop {
        let now = Utc::now();
        let next = next_run(now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(city = %city, next_run = %next, "Scheduled next ingest");

        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Ingest scheduler shutting down");
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        if !run_once(&state, &city, &mut shutdown_rx).await {
            break;
        }
    }
}

/// One scheduled ingest, raced against shutdown. Returns `false` once
/// shutdown has been observed; an abandoned run rolls back and releases its
/// guard on drop.
async fn run_once(
    state: &Arc<AppState>,
    city: &str,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> bool {
    if state.ingest_guard.is_running(city) {
        tracing::info!(city, "Skipping scheduled ingest; a run is already in progress");
        return true;
    }

    tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!(city, "Abandoning scheduled ingest for shutdown");
            false
        }
        result = ingest::run_ingest(state, city) => {
            match result {
                Ok(summary) => tracing::info!(
                    city,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    "Scheduled ingest complete"
                ),
                Err(AppError::Conflict(_)) => {
                    tracing::info!(city, "Skipping scheduled ingest; a run is already in progress")
                }
                Err(e) => tracing::error!(city, "Scheduled ingest failed: {}", e),
            }
            true
        }
    }
}

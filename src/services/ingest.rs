//! Ingest pipeline: fetch, normalize, reconcile, guarded so that only one
//! run per locality is in flight.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::db::EventRepository;
use crate::error::{AppError, AppResult};
use crate::services::{normalizer, reconciler};
use crate::AppState;

#[derive(Debug, Clone, Default)]
pub struct IngestGuard {
    running: Arc<Mutex<HashSet<String>>>,
}

/// Held for the duration of a run; releases the locality on drop.
#[derive(Debug)]
pub struct IngestPermit {
    running: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl IngestGuard {
    fn key(city: &str) -> String {
        city.trim().to_lowercase()
    }

    /// Claim `city`, or `None` if a run for it is already in flight.
    pub fn try_acquire(&self, city: &str) -> Option<IngestPermit> {
        let key = Self::key(city);
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(key.clone()) {
            return None;
        }
        Some(IngestPermit {
            running: self.running.clone(),
            key,
        })
    }

    pub fn is_running(&self, city: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&Self::key(city))
    }
}

impl Drop for IngestPermit {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestSummary {
    pub city: String,
    pub fetched: usize,
    pub dropped: usize,
    pub inserted: usize,
    pub updated: usize,
}

fn acquire(state: &AppState, city: &str) -> AppResult<IngestPermit> {
    state.ingest_guard.try_acquire(city).ok_or_else(|| {
        AppError::Conflict(format!("An ingest for {} is already running", city))
    })
}

/// Run the pipeline for `city` and wait for it to finish.
pub async fn run_ingest(state: &Arc<AppState>, city: &str) -> AppResult<IngestSummary> {
    let _permit = acquire(state, city)?;
    ingest(state, city).await
}

/// Start the pipeline for `city` in the background. The locality is claimed
/// before returning so a concurrent trigger is rejected immediately.
pub fn spawn_ingest(state: Arc<AppState>, city: String) -> AppResult<()> {
    let permit = acquire(&state, &city)?;
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(e) = ingest(&state, &city).await {
            tracing::error!(city = %city, "Background ingest failed: {}", e);
        }
    });
    Ok(())
}

async fn ingest(state: &Arc<AppState>, city: &str) -> AppResult<IngestSummary> {
    let source = state.source.name().to_string();
    tracing::info!(source = %source, city, "Starting ingest");

    // A failed fetch leaves the store untouched.
    let raw = state.source.fetch(city).await?;
    let (events, dropped) = normalizer::normalize_all(&raw, &source);
    let reconciled = reconciler::reconcile(&state.db, &events).await?;
    let stored = EventRepository::count_all(&state.db).await?;

    let summary = IngestSummary {
        city: city.to_string(),
        fetched: raw.len(),
        dropped,
        inserted: reconciled.inserted,
        updated: reconciled.updated,
    };
    tracing::info!(
        city,
        fetched = summary.fetched,
        dropped = summary.dropped,
        inserted = summary.inserted,
        updated = summary.updated,
        stored,
        "Ingest finished"
    );
    Ok(summary)
}

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::ingest;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/sync", post(sync_events))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CityQuery {
    pub city: Option<String>,
}

impl CityQuery {
    fn city_or(&self, default: &str) -> String {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(default)
            .to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: &'static str,
    pub added: usize,
    pub updated: usize,
    pub dropped: usize,
    pub total_found: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Run an ingest for the requested city and report the counts.
async fn sync_events(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<CityQuery>,
) -> AppResult<Json<SyncResponse>> {
    let city = query.city_or(&state.config.scheduler.city);
    tracing::info!(user_id = user.id, city = %city, "Manual sync requested");

    let summary = ingest::run_ingest(&state, &city).await?;

    Ok(Json(SyncResponse {
        status: "success",
        added: summary.inserted,
        updated: summary.updated,
        dropped: summary.dropped,
        total_found: summary.fetched,
    }))
}

/// Start an ingest in the background and return immediately.
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CityQuery>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let city = query.city_or(&state.config.scheduler.city);
    ingest::spawn_ingest(state.clone(), city.clone())?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": format!("Ingest for {} started in background", city)
        })),
    ))
}

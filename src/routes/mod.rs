use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub mod auth;
pub mod events;
pub mod health;
pub mod sync;
pub mod uploads;
pub mod users;

/// Assemble every route. The auth router is passed in so the caller can wrap
/// it with rate limiting.
pub fn router(auth_router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    let api = Router::new()
        .nest("/auth", auth_router)
        .merge(events::router())
        .merge(sync::router())
        .merge(uploads::router())
        .nest("/user", users::router());

    Router::new()
        .route("/health", get(health::health_check))
        .route("/scrape", post(sync::scrape))
        .nest("/api/v1", api)
}

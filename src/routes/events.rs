use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{
    CreateRegistration, Event, EventWithStats, RegistrationStatus,
};
use crate::db::{EventRepository, RegistrationRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::normalizer::{self, CreateEventRequest};
use crate::services::query::{self, EventFilter, EventListQuery, EventPage};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/my-events", get(my_events))
        .route("/events/:id/register", post(register_for_event))
        .route("/track-click", post(track_click))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub active: usize,
    pub pending: usize,
    pub total_registrations: i64,
}

#[derive(Debug, Serialize)]
pub struct MyEventsResponse {
    pub stats: DashboardStats,
    pub events: Vec<EventWithStats>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackClickRequest {
    pub event_id: i64,
    pub user_email: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventListQuery>,
) -> AppResult<Json<EventPage>> {
    let filter = EventFilter::from_query(&params, &state.categories);
    let page = query::search(&state.db, &filter).await?;
    Ok(Json(page))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<Event>)> {
    if body.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let new_event = normalizer::from_submission(body, &user, &state.config.server.public_url);
    let id = EventRepository::insert(&state.db, &new_event).await?;
    let event = EventRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    tracing::info!(user_id = user.id, event_id = id, "User created event");
    Ok((StatusCode::CREATED, Json(event)))
}

/// Events created by the current user, each with its registration count.
async fn my_events(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<MyEventsResponse>> {
    let events = EventRepository::find_created_by(&state.db, &user.email).await?;

    let mut total_registrations = 0;
    let mut with_stats = Vec::with_capacity(events.len());
    for event in events {
        let registration_count = RegistrationRepository::count_for_event(&state.db, event.id).await?;
        total_registrations += registration_count;
        with_stats.push(EventWithStats {
            event,
            registration_count,
            status: "Active".to_string(),
        });
    }

    Ok(Json(MyEventsResponse {
        stats: DashboardStats {
            active: with_stats.len(),
            pending: 0,
            total_registrations,
        },
        events: with_stats,
    }))
}

async fn register_for_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<i64>,
) -> AppResult<Json<RegisterResponse>> {
    let event = EventRepository::find_by_id(&state.db, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    if !event.is_free {
        return Err(AppError::BadRequest(
            "Registration is only supported for free events".to_string(),
        ));
    }

    if RegistrationRepository::find_by_event_and_email(&state.db, event_id, &user.email)
        .await?
        .is_some()
    {
        return Ok(Json(RegisterResponse {
            status: "ALREADY_REGISTERED",
            message: "You are already registered for this event.",
            confirmation_id: None,
        }));
    }

    let confirmation_id = format!("SELF-{}", chrono::Utc::now().timestamp());
    RegistrationRepository::create(
        &state.db,
        CreateRegistration {
            event_id,
            user_email: user.email.clone(),
            confirmation_id: Some(confirmation_id.clone()),
            status: RegistrationStatus::Success,
        },
    )
    .await?;

    tracing::info!(user_id = user.id, event_id, "Registered user for event");
    Ok(Json(RegisterResponse {
        status: "SUCCESS",
        message: "Registration verified and saved!",
        confirmation_id: Some(confirmation_id),
    }))
}

/// Record registration intent from an outbound click.
async fn track_click(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TrackClickRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if EventRepository::find_by_id(&state.db, body.event_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Event not found".to_string()));
    }

    let registration = RegistrationRepository::create(
        &state.db,
        CreateRegistration {
            event_id: body.event_id,
            user_email: body.user_email,
            confirmation_id: None,
            status: RegistrationStatus::Pending,
        },
    )
    .await?;

    Ok(Json(serde_json::json!({
        "status": "tracked",
        "id": registration.id
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewEvent;
    use crate::test_support::{
        authed_json_request, authed_request, bearer_for, json_request, send, test_state,
    };
    use axum::body::Body;
    use chrono::NaiveDate;
    use http::{Method, Request};
    use serde_json::json;

    async fn seed(state: &Arc<AppState>, external_id: &str, title: &str, description: &str, is_free: bool) -> i64 {
        let start = NaiveDate::from_ymd_opt(2025, 9, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap();
        let mut event = NewEvent::new(external_id, title, start, format!("https://www.eventbrite.com/e/{}", external_id));
        event.description = Some(description.to_string());
        event.is_free = is_free;
        EventRepository::insert(&state.db, &event).await.unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn list_filters_by_category_keywords() {
        let state = test_state().await;
        seed(&state, "E1", "AI Conference", "machine learning", true).await;
        seed(&state, "E2", "Cooking Class", "pasta", true).await;

        let (status, body) = send(&state, get("/api/v1/events?category=tech")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["title"], "AI Conference");

        let (_, body) = send(&state, get("/api/v1/events?date=not-a-date&limit=500")).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["limit"], 100);
    }

    #[tokio::test]
    async fn create_event_then_list_as_mine() {
        let state = test_state().await;
        let (_, auth) = bearer_for(&state, "owner@example.com").await;

        let (status, body) = send(
            &state,
            authed_json_request(
                Method::POST,
                "/api/v1/events",
                &auth,
                json!({
                    "title": "Founders Meetup",
                    "start_time": "2025-10-01T18:00:00",
                    "price": "0",
                    "agenda": [{"time": "18:00", "item": "Intro"}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["external_id"].as_str().unwrap().starts_with("usr-"));
        assert_eq!(body["organizer_name"], "Test User");
        assert_eq!(body["raw_data"]["created_by"], "owner@example.com");
        let event_id = body["id"].as_i64().unwrap();

        let (_, other) = bearer_for(&state, "guest@example.com").await;
        send(
            &state,
            authed_request(Method::POST, &format!("/api/v1/events/{}/register", event_id), &other),
        )
        .await;

        let (status, body) =
            send(&state, authed_request(Method::GET, "/api/v1/events/my-events", &auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["active"], 1);
        assert_eq!(body["stats"]["total_registrations"], 1);
        assert_eq!(body["events"][0]["registration_count"], 1);
        assert_eq!(body["events"][0]["status"], "Active");

        let (_, body) =
            send(&state, authed_request(Method::GET, "/api/v1/events/my-events", &other)).await;
        assert_eq!(body["stats"]["active"], 0);
    }

    #[tokio::test]
    async fn create_event_requires_auth() {
        let state = test_state().await;
        let (status, _) = send(
            &state,
            json_request(
                Method::POST,
                "/api/v1/events",
                json!({"title": "x", "start_time": "2025-10-01T18:00:00"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rules() {
        let state = test_state().await;
        let free = seed(&state, "F1", "Free Talk", "", true).await;
        let paid = seed(&state, "P1", "Paid Workshop", "", false).await;
        let (_, auth) = bearer_for(&state, "a@example.com").await;

        let uri = |id: i64| format!("/api/v1/events/{}/register", id);

        let (status, body) = send(&state, authed_request(Method::POST, &uri(free), &auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SUCCESS");
        assert!(body["confirmation_id"].as_str().unwrap().starts_with("SELF-"));

        let (status, body) = send(&state, authed_request(Method::POST, &uri(free), &auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ALREADY_REGISTERED");

        let (status, _) = send(&state, authed_request(Method::POST, &uri(paid), &auth)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, authed_request(Method::POST, &uri(9999), &auth)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(
            RegistrationRepository::count_for_event(&state.db, free).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn track_click_records_pending_intent() {
        let state = test_state().await;
        let id = seed(&state, "T1", "Talk", "", true).await;

        let (status, body) = send(
            &state,
            json_request(
                Method::POST,
                "/api/v1/track-click",
                json!({"event_id": id, "user_email": "v@example.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "tracked");

        let stored = RegistrationRepository::find_by_event_and_email(&state.db, id, "v@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RegistrationStatus::Pending);

        let (status, _) = send(
            &state,
            json_request(
                Method::POST,
                "/api/v1/track-click",
                json!({"event_id": 4242, "user_email": "v@example.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

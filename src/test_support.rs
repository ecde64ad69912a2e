//! Shared fixtures for tests: an `AppState` over an in-memory database with
//! stubbed collaborators, and helpers to drive the router.

use std::sync::Arc;

use axum::body::Body;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::config::Config;
use crate::db::testing::memory_pool;
use crate::services::auth::AuthService;
use crate::services::categories::CategoryKeywords;
use crate::services::identity::{testing::StubIdentity, IdentityProvider};
use crate::services::ingest::IngestGuard;
use crate::services::mailer::{testing::RecordingMailer, Mailer};
use crate::services::source::{testing::StubSource, EventSource};
use crate::AppState;

pub struct TestStateBuilder {
    config: Config,
    source: Arc<dyn EventSource>,
    mailer: Arc<dyn Mailer>,
    identity: Arc<dyn IdentityProvider>,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.jwt.secret = "test-secret".to_string();
        config.uploads.dir = std::env::temp_dir()
            .join(format!("eventhub-test-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();

        Self {
            config,
            source: Arc::new(StubSource::default()),
            mailer: Arc::new(RecordingMailer::default()),
            identity: Arc::new(StubIdentity::default()),
        }
    }

    pub fn configure(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = source;
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub async fn build(self) -> Arc<AppState> {
        Arc::new(AppState {
            db: memory_pool().await,
            config: self.config,
            source: self.source,
            mailer: self.mailer,
            identity: self.identity,
            ingest_guard: IngestGuard::default(),
            categories: CategoryKeywords::default(),
        })
    }
}

pub async fn test_state() -> Arc<AppState> {
    TestStateBuilder::new().build().await
}

/// Register `email` and return the user id with a ready `Authorization` value.
pub async fn bearer_for(state: &Arc<AppState>, email: &str) -> (i64, String) {
    let user = AuthService::register(state, email, "password", Some("Test User".into()))
        .await
        .unwrap();
    let token = AuthService::create_jwt(state, &user.email).unwrap();
    (user.id, format!("Bearer {}", token))
}

pub fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed_json_request(
    method: Method,
    uri: &str,
    auth: &str,
    body: serde_json::Value,
) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request
        .headers_mut()
        .insert(http::header::AUTHORIZATION, auth.parse().unwrap());
    request
}

pub fn authed_request(method: Method, uri: &str, auth: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, auth)
        .body(Body::empty())
        .unwrap()
}

pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Run one request through the full router (without rate limiting) and
/// decode the JSON body; an empty or non-JSON body decodes to `Null`.
pub async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let app = crate::routes::router(crate::routes::auth::router()).with_state(state.clone());
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

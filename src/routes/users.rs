use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db::models::{ProfileUpdate, User};
use crate::db::UserRepository;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            first_name: user.first_name,
            last_name: user.last_name,
            job_title: user.job_title,
            company: user.company,
            phone: user.phone,
            bio: user.bio,
            profile_image: user.profile_image,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdateResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub user: ProfileResponse,
}

async fn get_profile(AuthUser(user): AuthUser) -> Json<ProfileResponse> {
    Json(user.into())
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(body): Json<ProfileUpdate>,
) -> AppResult<Json<ProfileUpdateResponse>> {
    let updated = UserRepository::update_profile(&state.db, user.id, &body).await?;
    tracing::info!(user_id = user.id, "Profile updated");

    Ok(Json(ProfileUpdateResponse {
        status: "success",
        message: "Profile updated successfully",
        user: updated.into(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{authed_json_request, authed_request, bearer_for, send, test_state};
    use http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn update_recomputes_full_name() {
        let state = test_state().await;
        let (_, auth) = bearer_for(&state, "p@example.com").await;

        let (status, body) = send(
            &state,
            authed_json_request(
                Method::PUT,
                "/api/v1/user/profile",
                &auth,
                json!({"first_name": "Grace", "last_name": "Hopper", "company": "Navy"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["full_name"], "Grace Hopper");

        let (status, body) =
            send(&state, authed_request(Method::GET, "/api/v1/user/profile", &auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["company"], "Navy");
        assert_eq!(body["email"], "p@example.com");
        assert!(body.get("hashed_password").is_none());
    }

    #[tokio::test]
    async fn profile_requires_auth() {
        let state = test_state().await;
        let (status, _) = send(
            &state,
            authed_request(Method::GET, "/api/v1/user/profile", "Bearer nope"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

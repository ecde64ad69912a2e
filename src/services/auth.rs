use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::db::models::{CreateUser, User};
use crate::db::UserRepository;
use crate::error::{AppError, AppResult};
use crate::services::mailer::password_reset_mail;
use crate::AppState;

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

const RESET_CODE_TTL_MINUTES: i64 = 10;

pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for this email, a reset code has been sent.";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

pub struct AuthService;

impl AuthService {
    // ========================================================================
    // Tokens
    // ========================================================================

    /// Create a signed JWT whose subject is the user's email
    pub fn create_jwt(state: &Arc<AppState>, email: &str) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(state.config.jwt.expiration_hours);
        let claims = Claims {
            sub: email.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and validate a JWT, returning the claims
    pub fn decode_jwt(state: &Arc<AppState>, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Resolve the active user a JWT belongs to
    pub async fn get_user_from_token(state: &Arc<AppState>, token: &str) -> AppResult<User> {
        let claims = Self::decode_jwt(state, token).map_err(|_| AppError::Unauthorized)?;
        let user = UserRepository::find_by_email(&state.db, &claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::Unauthorized)?;
        Ok(user)
    }

    // ========================================================================
    // Password accounts
    // ========================================================================

    pub fn hash_password(password: &str) -> AppResult<String> {
        bcrypt::hash(password, BCRYPT_COST).map_err(|e| AppError::Internal(e.into()))
    }

    pub async fn register(
        state: &Arc<AppState>,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> AppResult<User> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::BadRequest("A valid email is required".to_string()));
        }
        if password.is_empty() {
            return Err(AppError::BadRequest("Password must not be empty".to_string()));
        }

        if UserRepository::find_by_email(&state.db, email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let user = UserRepository::create(
            &state.db,
            CreateUser {
                email: email.to_string(),
                full_name: full_name.filter(|n| !n.trim().is_empty()),
                hashed_password: Self::hash_password(password)?,
            },
        )
        .await?;

        tracing::info!(user_id = user.id, "Registered new user");
        Ok(user)
    }

    pub async fn login(state: &Arc<AppState>, email: &str, password: &str) -> AppResult<TokenResponse> {
        let user = UserRepository::find_by_email(&state.db, email.trim())
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !bcrypt::verify(password, &user.hashed_password).unwrap_or(false) {
            tracing::debug!(user_id = user.id, "Password mismatch");
            return Err(AppError::Unauthorized);
        }
        if !user.is_active {
            return Err(AppError::Unauthorized);
        }

        Ok(TokenResponse::bearer(Self::create_jwt(state, &user.email)?))
    }

    // ========================================================================
    // Federated login
    // ========================================================================

    /// Exchange a Google ID token for a session token, creating a shadow
    /// account on first sight of the email.
    pub async fn google_login(state: &Arc<AppState>, id_token: &str) -> AppResult<TokenResponse> {
        let identity = state.identity.verify(id_token).await?;
        let email = identity
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("Google account has no email".to_string()))?;

        let user = match UserRepository::find_by_email(&state.db, &email).await? {
            Some(user) => user,
            None => {
                // Unusable password: nobody knows the plaintext.
                let placeholder = Self::generate_random_string(32);
                let created = UserRepository::create(
                    &state.db,
                    CreateUser {
                        email: email.clone(),
                        full_name: identity.name,
                        hashed_password: Self::hash_password(&placeholder)?,
                    },
                )
                .await?;
                tracing::info!(user_id = created.id, "Created account from Google login");
                created
            }
        };

        if !user.is_active {
            return Err(AppError::Unauthorized);
        }

        Ok(TokenResponse::bearer(Self::create_jwt(state, &user.email)?))
    }

    // ========================================================================
    // Password reset
    // ========================================================================

    /// Issue and mail a reset code. The response never reveals whether the
    /// account exists.
    pub async fn forgot_password(state: &Arc<AppState>, email: &str) -> AppResult<&'static str> {
        let Some(user) = UserRepository::find_by_email(&state.db, email.trim()).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(FORGOT_PASSWORD_MESSAGE);
        };

        let otp = Self::generate_reset_code();
        let expires_at = (Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES)).naive_utc();
        UserRepository::set_reset_code(&state.db, user.id, &otp, expires_at).await?;

        if let Err(e) = state.mailer.send(&password_reset_mail(&user.email, &otp)).await {
            tracing::warn!(user_id = user.id, "Failed to send password reset mail: {}", e);
        }

        Ok(FORGOT_PASSWORD_MESSAGE)
    }

    pub async fn reset_password(
        state: &Arc<AppState>,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = UserRepository::find_by_email(&state.db, email.trim())
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid OTP".to_string()))?;

        if user.reset_otp.as_deref() != Some(otp) {
            return Err(AppError::BadRequest("Invalid OTP".to_string()));
        }
        let now = Utc::now().naive_utc();
        match user.otp_expires_at {
            Some(expires_at) if expires_at >= now => {}
            _ => return Err(AppError::BadRequest("OTP has expired".to_string())),
        }
        if new_password.is_empty() {
            return Err(AppError::BadRequest("Password must not be empty".to_string()));
        }

        let hash = Self::hash_password(new_password)?;
        // A concurrent reset may have consumed the code since the read above.
        if !UserRepository::consume_reset_code(&state.db, user.id, otp, &hash, now).await? {
            return Err(AppError::BadRequest("Invalid OTP".to_string()));
        }

        tracing::info!(user_id = user.id, "Password reset completed");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    pub fn generate_reset_code() -> String {
        format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
    }

    pub fn generate_random_string(length: usize) -> String {
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::testing::StubIdentity;
    use crate::services::mailer::testing::RecordingMailer;
    use crate::test_support::{test_state, TestStateBuilder};

    #[tokio::test]
    async fn register_then_login_issues_bearer_token() {
        let state = test_state().await;
        let user = AuthService::register(&state, "a@example.com", "secret", Some("Ann".into()))
            .await
            .unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Ann"));
        assert_ne!(user.hashed_password, "secret");

        let token = AuthService::login(&state, "a@example.com", "secret").await.unwrap();
        assert_eq!(token.token_type, "bearer");
        let claims = AuthService::decode_jwt(&state, &token.access_token).unwrap();
        assert_eq!(claims.sub, "a@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let state = test_state().await;
        AuthService::register(&state, "a@example.com", "secret", None).await.unwrap();
        let err = AuthService::register(&state, "a@example.com", "other", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_unauthorized() {
        let state = test_state().await;
        AuthService::register(&state, "a@example.com", "secret", None).await.unwrap();

        assert!(matches!(
            AuthService::login(&state, "a@example.com", "nope").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            AuthService::login(&state, "ghost@example.com", "secret").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn google_login_creates_exactly_one_account() {
        let state = TestStateBuilder::new()
            .identity(Arc::new(StubIdentity::with(
                "good-token",
                Some("g@example.com"),
                Some("Gina"),
            )))
            .build()
            .await;

        let first = AuthService::google_login(&state, "good-token").await.unwrap();
        let second = AuthService::google_login(&state, "good-token").await.unwrap();
        assert_eq!(first.token_type, "bearer");
        assert_eq!(second.token_type, "bearer");

        assert_eq!(
            UserRepository::count_by_email(&state.db, "g@example.com").await.unwrap(),
            1
        );
        let user = UserRepository::find_by_email(&state.db, "g@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Gina"));
    }

    #[tokio::test]
    async fn google_login_without_email_is_bad_request() {
        let state = TestStateBuilder::new()
            .identity(Arc::new(StubIdentity::with("no-email", None, None)))
            .build()
            .await;
        assert!(matches!(
            AuthService::google_login(&state, "no-email").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            AuthService::google_login(&state, "forged").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn forgot_password_does_not_reveal_accounts() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = TestStateBuilder::new().mailer(mailer.clone()).build().await;
        AuthService::register(&state, "a@example.com", "secret", None).await.unwrap();

        let known = AuthService::forgot_password(&state, "a@example.com").await.unwrap();
        let unknown = AuthService::forgot_password(&state, "ghost@example.com").await.unwrap();
        assert_eq!(known, unknown);

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_request() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let state = TestStateBuilder::new().mailer(mailer).build().await;
        AuthService::register(&state, "a@example.com", "secret", None).await.unwrap();

        assert_eq!(
            AuthService::forgot_password(&state, "a@example.com").await.unwrap(),
            FORGOT_PASSWORD_MESSAGE
        );
    }

    #[tokio::test]
    async fn reset_code_works_once() {
        let state = test_state().await;
        AuthService::register(&state, "a@example.com", "old", None).await.unwrap();
        AuthService::forgot_password(&state, "a@example.com").await.unwrap();
        let otp = UserRepository::find_by_email(&state.db, "a@example.com")
            .await
            .unwrap()
            .unwrap()
            .reset_otp
            .unwrap();
        assert_eq!(otp.len(), 6);

        AuthService::reset_password(&state, "a@example.com", &otp, "new").await.unwrap();
        AuthService::login(&state, "a@example.com", "new").await.unwrap();

        let err = AuthService::reset_password(&state, "a@example.com", &otp, "newer")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let state = test_state().await;
        let user = AuthService::register(&state, "a@example.com", "old", None).await.unwrap();
        let past = (Utc::now() - Duration::minutes(1)).naive_utc();
        UserRepository::set_reset_code(&state.db, user.id, "123456", past)
            .await
            .unwrap();

        let err = AuthService::reset_password(&state, "a@example.com", "123456", "new")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "OTP has expired"));
        AuthService::login(&state, "a@example.com", "old").await.unwrap();
    }

    #[tokio::test]
    async fn token_for_unknown_user_is_rejected() {
        let state = test_state().await;
        let token = AuthService::create_jwt(&state, "ghost@example.com").unwrap();
        assert!(matches!(
            AuthService::get_user_from_token(&state, &token).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            AuthService::get_user_from_token(&state, "garbage").await,
            Err(AppError::Unauthorized)
        ));
    }
}

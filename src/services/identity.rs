//! Federated identity: verification of Google-issued ID tokens.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::GoogleConfig;
use crate::error::{AppError, AppResult};

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify an ID token and return the identity it asserts.
    async fn verify(&self, token: &str) -> AppResult<VerifiedIdentity>;
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    email: Option<String>,
    name: Option<String>,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct GoogleIdentityProvider {
    client: Client,
    client_id: Option<String>,
    certs_url: String,
    leeway: u64,
    keys: RwLock<Option<CachedKeys>>,
}

impl GoogleIdentityProvider {
    pub fn new(config: &GoogleConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            certs_url: config.certs_url.clone(),
            leeway: config.leeway_seconds,
            keys: RwLock::new(None),
        })
    }

    /// Look up `kid` in the cached key set, refreshing it when the key is
    /// unknown or the cache is stale.
    async fn key_for(&self, kid: &str) -> AppResult<DecodingKey> {
        {
            let cache = self.keys.read().await;
            if let Some(ref cached) = *cache {
                if cached.fetched_at.elapsed() < KEY_CACHE_TTL {
                    if let Some(jwk) = cached.set.find(kid) {
                        return DecodingKey::from_jwk(jwk).map_err(|_| AppError::Unauthorized);
                    }
                }
            }
        }

        let set = self.fetch_keys().await?;
        let key = set
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|_| AppError::Unauthorized)?;

        *self.keys.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });

        key.ok_or(AppError::Unauthorized)
    }

    async fn fetch_keys(&self) -> AppResult<JwkSet> {
        tracing::debug!("Refreshing Google signing keys");
        let response = self.client.get(&self.certs_url).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Failed to fetch Google certificates: {}",
                error_text
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Google certificates: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn verify(&self, token: &str) -> AppResult<VerifiedIdentity> {
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            AppError::ServiceUnavailable("Google login is not configured".to_string())
        })?;

        let header = decode_header(token).map_err(|e| {
            tracing::debug!("Rejecting malformed Google token: {}", e);
            AppError::Unauthorized
        })?;
        let kid = header.kid.ok_or(AppError::Unauthorized)?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[client_id]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.leeway = self.leeway;

        let data = decode::<GoogleClaims>(token, &key, &validation).map_err(|e| {
            tracing::debug!("Rejecting Google token: {}", e);
            AppError::Unauthorized
        })?;

        Ok(VerifiedIdentity {
            email: data.claims.email,
            name: data.claims.name,
        })
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;

    /// Accepts only the tokens it was built with.
    #[derive(Default)]
    pub struct StubIdentity {
        pub tokens: HashMap<String, VerifiedIdentity>,
    }

    impl StubIdentity {
        pub fn with(token: &str, email: Option<&str>, name: Option<&str>) -> Self {
            let mut tokens = HashMap::new();
            tokens.insert(
                token.to_string(),
                VerifiedIdentity {
                    email: email.map(str::to_string),
                    name: name.map(str::to_string),
                },
            );
            Self { tokens }
        }
    }

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        async fn verify(&self, token: &str) -> AppResult<VerifiedIdentity> {
            self.tokens.get(token).cloned().ok_or(AppError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn unconfigured_provider_is_unavailable() {
        let provider = GoogleIdentityProvider::new(&Config::default().google).unwrap();
        let err = provider.verify("anything").await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn malformed_token_is_unauthorized() {
        let mut config = Config::default().google;
        config.client_id = Some("client-123".into());
        let provider = GoogleIdentityProvider::new(&config).unwrap();
        let err = provider.verify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }
}

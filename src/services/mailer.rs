//! Outbound email. The relay is a plain HTTP endpoint accepting
//! `{from, to, subject, text}`; without one configured, mail is only logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::MailConfig;
use crate::error::{AppError, AppResult};
use crate::services::retry::with_single_retry;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> AppResult<()>;
}

/// Build the mailer selected by configuration.
pub fn from_config(config: &MailConfig) -> AppResult<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match config.api_url {
        Some(ref url) => Arc::new(HttpMailer::new(url, config)?),
        None => {
            tracing::warn!("MAIL_API_URL not set; outgoing mail will only be logged");
            Arc::new(LogMailer)
        }
    };
    Ok(mailer)
}

pub fn password_reset_mail(to: &str, otp: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Your password reset code".to_string(),
        text: format!(
            "Use the code {} to reset your password. It expires in 10 minutes.\n\n\
             If you did not request a reset you can ignore this message.",
            otp
        ),
    }
}

// ============================================================================
// HTTP relay
// ============================================================================

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

pub struct HttpMailer {
    client: Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(url: &str, config: &MailConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }

    async fn post(&self, mail: &OutgoingMail) -> AppResult<()> {
        let mut request = self.client.post(&self.url).json(&RelayRequest {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.text,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Mail relay responded with {}: {}",
                status, error_text
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &OutgoingMail) -> AppResult<()> {
        with_single_retry("mail relay", Duration::from_secs(1), || self.post(mail)).await?;
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}

// ============================================================================
// Log-only
// ============================================================================

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> AppResult<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail relay not configured; dropping message");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_mail_contains_code() {
        let mail = password_reset_mail("a@example.com", "123456");
        assert_eq!(mail.to, "a@example.com");
        assert!(mail.text.contains("123456"));
    }

    #[tokio::test]
    async fn unconfigured_mailer_logs_only() {
        let mailer = from_config(&crate::config::Config::default().mail).unwrap();
        mailer
            .send(&password_reset_mail("a@example.com", "000000"))
            .await
            .unwrap();
    }
}

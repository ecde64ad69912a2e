//! Source fetcher: pulls raw listings for a locality from a third-party
//! listing API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::{AppError, AppResult};
use crate::services::retry::with_single_retry;

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short source name recorded as provenance on every normalized record.
    fn name(&self) -> &str;

    /// Fetch all raw records for `city`. Any transport or envelope error
    /// aborts the whole fetch; the shape of individual records is checked by
    /// the normalizer.
    async fn fetch(&self, city: &str) -> AppResult<Vec<Value>>;
}

// ============================================================================
// Eventbrite
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    events: Vec<Value>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more_items: bool,
    continuation: Option<String>,
}

#[derive(Clone)]
pub struct EventbriteSource {
    client: Client,
    name: String,
    api_url: String,
    api_token: Option<String>,
    max_pages: u32,
    retry_backoff: Duration,
}

impl EventbriteSource {
    pub fn new(config: &SourceConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            name: config.name.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            max_pages: config.max_pages.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    fn search_url(&self, city: &str, continuation: Option<&str>) -> AppResult<url::Url> {
        let mut url = url::Url::parse(&format!("{}/events/search/", self.api_url))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid source URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("location.address", city)
                .append_pair("expand", "venue,organizer,category")
                .append_pair("sort_by", "date");
            if let Some(token) = continuation {
                query.append_pair("continuation", token);
            }
        }
        Ok(url)
    }

    async fn fetch_page(&self, url: &url::Url) -> AppResult<SearchPage> {
        let mut request = self.client.get(url.clone());
        if let Some(ref token) = self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "{} responded with {}: {}",
                self.name, status, error_text
            )));
        }

        response
            .json::<SearchPage>()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse {} page: {}", self.name, e)))
    }
}

#[async_trait]
impl EventSource for EventbriteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, city: &str) -> AppResult<Vec<Value>> {
        let mut records = Vec::new();
        let mut continuation: Option<String> = None;

        for page in 1..=self.max_pages {
            let url = self.search_url(city, continuation.as_deref())?;
            let label = format!("{} page {} for {}", self.name, page, city);
            let body = with_single_retry(&label, self.retry_backoff, || self.fetch_page(&url)).await?;

            tracing::debug!(page, count = body.events.len(), "Fetched source page");
            records.extend(body.events);

            continuation = match body.pagination {
                Some(Pagination {
                    has_more_items: true,
                    continuation: Some(next),
                }) => Some(next),
                _ => break,
            };
        }

        tracing::info!(source = %self.name, city, fetched = records.len(), "Source fetch complete");
        Ok(records)
    }
}

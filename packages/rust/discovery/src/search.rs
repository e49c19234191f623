//! Search-provider seam and the Tavily client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use neolabs_crawler::http_client;
use neolabs_shared::{
    NeoLabsError, RETRY_BACKOFF, Result, SearchConfig, SearchDepth, SearchTopic,
    retry_once,
};

/// One query against a search provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    /// Recency window in days.
    pub days: u32,
    pub topic: SearchTopic,
    pub depth: SearchDepth,
    pub max_results: u32,
    /// Restrict results to these domains (empty = no restriction).
    pub include_domains: Vec<String>,
}

/// One search hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>>;

    /// Provider name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tavily
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TavilyBody<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: SearchDepth,
    topic: SearchTopic,
    max_results: u32,
    days: u32,
    include_answer: bool,
    include_raw_content: bool,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_domains: &'a [String],
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize)]
struct TavilyHit {
    title: Option<String>,
    url: Option<String>,
    published_date: Option<String>,
    source: Option<String>,
}

/// Tavily `/search` client.
pub struct TavilyClient {
    client: Client,
    base_url: String,
    api_key: String,
    backoff: Duration,
}

impl TavilyClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            backoff: RETRY_BACKOFF,
        })
    }

    /// Client from config, or `None` without a key.
    pub fn from_config(config: &SearchConfig, api_key: Option<&str>) -> Result<Option<Self>> {
        let Some(key) = api_key else {
            return Ok(None);
        };
        Self::new(
            config.base_url.clone(),
            key,
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    /// Override the retry backoff (tests).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn search_once(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);
        let body = TavilyBody {
            api_key: &self.api_key,
            query: &request.query,
            search_depth: request.depth,
            topic: request.topic,
            max_results: request.max_results,
            days: request.days,
            include_answer: false,
            include_raw_content: false,
            include_domains: &request.include_domains,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NeoLabsError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NeoLabsError::Network(format!("{url}: HTTP {status}")));
        }

        let payload: TavilyResponse = response
            .json()
            .await
            .map_err(|e| NeoLabsError::parse(format!("{url}: invalid search response: {e}")))?;

        Ok(payload
            .results
            .into_iter()
            .map(|hit| SearchResult {
                published_at: hit.published_date.as_deref().and_then(parse_published),
                title: hit.title,
                url: hit.url,
                publisher: hit.source,
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        debug!(query = %request.query, "tavily search");
        retry_once("tavily", self.backoff, || self.search_once(request)).await
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// Accept RFC 3339, RFC 2822 or a bare date.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

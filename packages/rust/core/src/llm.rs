//! LLM fallback for entity resolution (Mistral chat completions).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use neolabs_crawler::http_client;
use neolabs_shared::{LlmConfig, NeoLabsError, RETRY_BACKOFF, Result, retry_once};

/// Longest evidence field sent to the model, in characters.
pub const MAX_FIELD_CHARS: usize = 600;

const SYSTEM_PROMPT: &str = "You extract the single most likely company name from the given evidence. \
Return JSON: {\"company_name\": string|null}.";

const RULES: [&str; 4] = [
    "Return null if no specific company is mentioned.",
    "Remove generic descriptors like 'AI startup', 'startup', or 'company'.",
    "Preserve brand words like 'Labs' if they are part of the name.",
    "Return only the company name, not investors or people.",
];

/// Evidence about one document, as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameQuery {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub meta_description: Option<String>,
    pub json_ld_names: Vec<String>,
    pub candidate_hints: Vec<String>,
}

impl NameQuery {
    /// Truncate free-text fields to [`MAX_FIELD_CHARS`].
    pub fn truncated(mut self) -> Self {
        for field in [&mut self.title, &mut self.snippet, &mut self.meta_description] {
            if let Some(text) = field {
                if let Some((cut, _)) = text.char_indices().nth(MAX_FIELD_CHARS) {
                    text.truncate(cut);
                }
            }
        }
        self
    }
}

/// Picks at most one company name from document evidence.
#[async_trait]
pub trait LlmFallback: Send + Sync {
    /// `Ok(None)` when the model names no company or answers unusably.
    async fn company_name(&self, query: &NameQuery) -> Result<Option<String>>;

    /// Provider name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Mistral
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Mistral `/v1/chat/completions` client in JSON mode.
pub struct MistralClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    backoff: Duration,
}

impl MistralClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            backoff: RETRY_BACKOFF,
        })
    }

    /// Client from config, or `None` without a key.
    pub fn from_config(config: &LlmConfig, api_key: Option<&str>) -> Result<Option<Self>> {
        let Some(key) = api_key else {
            return Ok(None);
        };
        Self::new(
            config.base_url.clone(),
            key,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    /// Override the retry backoff (tests).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn complete_once(&self, body: &serde_json::Value) -> Result<Option<String>> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| NeoLabsError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NeoLabsError::Network(format!("{url}: HTTP {status}")));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| NeoLabsError::Llm(format!("{url}: invalid chat response: {e}")))?;

        Ok(payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content))
    }
}

#[async_trait]
impl LlmFallback for MistralClient {
    async fn company_name(&self, query: &NameQuery) -> Result<Option<String>> {
        let user = serde_json::to_string(&json!({
            "url": query.url,
            "title": query.title,
            "snippet": query.snippet,
            "meta_description": query.meta_description,
            "json_ld_names": query.json_ld_names,
            "candidate_hints": query.candidate_hints,
            "rules": RULES,
        }))
        .map_err(|e| NeoLabsError::Llm(format!("failed to encode evidence: {e}")))?;

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0,
        });

        debug!(url = %query.url, "mistral entity resolution");
        let content = retry_once("mistral", self.backoff, || self.complete_once(&body)).await?;
        Ok(content.as_deref().and_then(parse_company_name))
    }

    fn name(&self) -> &str {
        "mistral"
    }
}

/// Pull `company_name` out of a model answer; anything malformed is `None`.
pub fn parse_company_name(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(content)).ok()?;
    value
        .get("company_name")?
        .as_str()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query() -> NameQuery {
        NameQuery {
            url: "https://techcrunch.com/2025/03/01/stealth-lab/".into(),
            title: Some("Exclusive: AI startup raises $20M".into()),
            snippet: None,
            meta_description: None,
            json_ld_names: vec![],
            candidate_hints: vec!["AI startup".into()],
        }
    }

    fn client(server: &MockServer) -> MistralClient {
        MistralClient::new(server.uri(), "mist-test", "mistral-large-latest", Duration::from_secs(5))
            .unwrap()
            .with_backoff(Duration::ZERO)
    }

    fn answer(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn sends_json_mode_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer mist-test"))
            .and(body_partial_json(json!({
                "model": "mistral-large-latest",
                "response_format": {"type": "json_object"},
                "temperature": 0
            })))
            .respond_with(answer(r#"{"company_name": " Nexus Labs "}"#))
            .expect(1)
            .mount(&server)
            .await;

        let name = client(&server).company_name(&query()).await.unwrap();
        assert_eq!(name.as_deref(), Some("Nexus Labs"));
    }

    #[tokio::test]
    async fn malformed_answer_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer("I think it is Nexus Labs."))
            .mount(&server)
            .await;
        assert_eq!(client(&server).company_name(&query()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_errors_retry_then_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;
        assert!(client(&server).company_name(&query()).await.is_err());
    }

    #[test]
    fn parses_fenced_and_null_answers() {
        assert_eq!(
            parse_company_name("```json\n{\"company_name\": \"Reka\"}\n```").as_deref(),
            Some("Reka")
        );
        assert_eq!(parse_company_name(r#"{"company_name": null}"#), None);
        assert_eq!(parse_company_name(r#"{"company_name": 42}"#), None);
        assert_eq!(parse_company_name(""), None);
    }

    #[test]
    fn truncates_long_fields() {
        let long = NameQuery {
            snippet: Some("é".repeat(700)),
            ..query()
        }
        .truncated();
        assert_eq!(long.snippet.unwrap().chars().count(), MAX_FIELD_CHARS);
        assert_eq!(long.title.as_deref(), Some("Exclusive: AI startup raises $20M"));
    }
}

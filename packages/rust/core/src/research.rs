//! Deep-research client (Parallel task groups).
//!
//! One batch per refresh: create a task group, add one run per company,
//! poll the group until it goes idle or the attempt budget runs out, then
//! fetch each run's result one at a time. A run that has not completed by
//! then is reported as absent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use neolabs_crawler::http_client;
use neolabs_shared::{
    KnownCompany, NeoLabsError, RETRY_BACKOFF, ResearchConfig, Result, retry_once,
};

// ---------------------------------------------------------------------------
// Result types (all fields optional; coerced by the reconciler)
// ---------------------------------------------------------------------------

/// Structured company profile returned by a research run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompanyProfile {
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub website_url: Option<String>,
    pub canonical_domain: Option<String>,
    pub description: Option<String>,
    pub focus: Option<String>,
    pub employee_count: Option<f64>,
    pub known_revenue: Option<String>,
    pub status: Option<String>,
    pub founded_year: Option<f64>,
    pub hq_location: Option<String>,
    pub valuation_usd: Option<f64>,
    pub valuation_as_of: Option<String>,
    pub valuation_source_url: Option<String>,
    pub sources: Option<Vec<ProfileSource>>,
    pub funding_rounds: Option<Vec<ProfileRound>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileSource {
    pub url: Option<String>,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileRound {
    pub round_type: Option<String>,
    pub amount_usd: Option<f64>,
    pub valuation_usd: Option<f64>,
    pub announced_at: Option<String>,
    pub investors: Option<Vec<String>>,
    pub source_url: Option<String>,
}

/// Evidence the provider cites for one output field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldBasis {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Citation {
    pub url: Option<String>,
    pub excerpt: Option<String>,
    pub quote: Option<String>,
    pub snippet: Option<String>,
    pub text: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub excerpts: Vec<String>,
}

/// One completed research run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchResult {
    pub content: CompanyProfile,
    pub basis: Vec<FieldBasis>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Sleeping
// ---------------------------------------------------------------------------

/// Waits between polls. Injected so tests do not sleep.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Batch state machine
// ---------------------------------------------------------------------------

/// Lifecycle of one research batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchState {
    /// Group created and runs added.
    Submitted { group_id: String, run_ids: Vec<String> },
    /// Waiting for the group to go idle; `attempt` polls done so far.
    Polling {
        group_id: String,
        run_ids: Vec<String>,
        attempt: u32,
    },
    /// The group went idle.
    Completed { run_ids: Vec<String> },
    /// The poll budget ran out with runs still active.
    TimedOut { run_ids: Vec<String> },
    /// Status polling failed.
    Failed { run_ids: Vec<String>, reason: String },
}

impl ResearchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::TimedOut { .. } | Self::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Polling { .. } => "polling",
            Self::Completed { .. } => "completed",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateGroupResponse {
    taskgroup_id: Option<String>,
}

#[derive(Deserialize)]
struct AddRunsResponse {
    #[serde(default)]
    run_ids: Vec<String>,
}

#[derive(Deserialize)]
struct GroupResponse {
    status: Option<GroupStatus>,
}

#[derive(Deserialize)]
struct GroupStatus {
    #[serde(default)]
    is_active: bool,
}

#[derive(Deserialize)]
struct RunResultResponse {
    run: Option<RunInfo>,
    output: Option<RunOutput>,
}

#[derive(Deserialize)]
struct RunInfo {
    status: Option<String>,
}

#[derive(Deserialize)]
struct RunOutput {
    content: Option<Value>,
    basis: Option<Value>,
}

#[derive(Serialize)]
struct RunInput<'a> {
    processor: &'a str,
    input: CompanyInput<'a>,
}

#[derive(Serialize)]
struct CompanyInput<'a> {
    company_id: &'a str,
    company_name: &'a str,
    company_website: Option<&'a str>,
}

fn nullable(kind: &str) -> Value {
    json!({ "type": [kind, "null"] })
}

fn input_schema() -> Value {
    json!({
        "type": "json",
        "json_schema": {
            "type": "object",
            "properties": {
                "company_id": { "type": "string" },
                "company_name": { "type": "string" },
                "company_website": nullable("string"),
            },
            "required": ["company_id", "company_name"],
            "additionalProperties": false,
        }
    })
}

fn output_schema() -> Value {
    let source = json!({
        "type": "object",
        "properties": {
            "url": nullable("string"),
            "title": nullable("string"),
            "publisher": nullable("string"),
            "published_at": nullable("string"),
        },
        "required": ["url", "title", "publisher", "published_at"],
        "additionalProperties": false,
    });
    let round = json!({
        "type": "object",
        "properties": {
            "round_type": nullable("string"),
            "amount_usd": nullable("integer"),
            "valuation_usd": {
                "type": ["integer", "null"],
                "description": "Post-money valuation in USD if publicly reported; otherwise null.",
            },
            "announced_at": { "type": ["string", "null"], "description": "YYYY-MM-DD if known." },
            "investors": { "type": ["array", "null"], "items": { "type": "string" } },
            "source_url": nullable("string"),
        },
        "required": ["round_type", "amount_usd", "valuation_usd", "announced_at", "investors", "source_url"],
        "additionalProperties": false,
    });
    json!({
        "type": "json",
        "json_schema": {
            "type": "object",
            "properties": {
                "company_id": { "type": ["string", "null"], "description": "Echo the company_id from input." },
                "company_name": nullable("string"),
                "website_url": { "type": ["string", "null"], "description": "Official website URL if confidently identified." },
                "canonical_domain": nullable("string"),
                "description": nullable("string"),
                "focus": {
                    "type": ["string", "null"],
                    "description": "One concise sentence describing the company's focus. No funding, valuation, or revenue details.",
                },
                "employee_count": nullable("integer"),
                "known_revenue": nullable("string"),
                "status": { "type": ["string", "null"], "description": "One of: active | stealth | inactive | unknown." },
                "founded_year": nullable("integer"),
                "hq_location": nullable("string"),
                "valuation_usd": nullable("integer"),
                "valuation_as_of": { "type": ["string", "null"], "description": "YYYY-MM-DD if known." },
                "valuation_source_url": nullable("string"),
                "sources": { "type": ["array", "null"], "items": source },
                "funding_rounds": {
                    "type": ["array", "null"],
                    "description": "Up to 5 notable funding rounds.",
                    "items": round,
                },
            },
            "required": [
                "company_id", "company_name", "website_url", "canonical_domain", "description",
                "focus", "employee_count", "known_revenue", "status", "founded_year",
                "hq_location", "sources", "funding_rounds",
            ],
            "additionalProperties": false,
        }
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Batch company research.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Every input id maps to its result, or `None` when nothing usable came
    /// back. `Err` means the batch as a whole could not be submitted.
    async fn research(
        &self,
        companies: &[KnownCompany],
    ) -> Result<HashMap<String, Option<ResearchResult>>>;

    /// Provider name for tracing.
    fn name(&self) -> &str;
}

#[async_trait]
impl ResearchProvider for ParallelClient {
    async fn research(
        &self,
        companies: &[KnownCompany],
    ) -> Result<HashMap<String, Option<ResearchResult>>> {
        ParallelClient::research(self, companies).await
    }

    fn name(&self) -> &str {
        "parallel"
    }
}

/// Parallel task-group client.
pub struct ParallelClient {
    client: Client,
    base_url: String,
    api_key: String,
    processor: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
    backoff: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl ParallelClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, config: &ResearchConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            processor: config.processor.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_poll_attempts: config.max_poll_attempts,
            backoff: RETRY_BACKOFF,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Client from config, or `None` without a key.
    pub fn from_config(config: &ResearchConfig, api_key: Option<&str>) -> Result<Option<Self>> {
        let Some(key) = api_key else {
            return Ok(None);
        };
        Self::new(config.base_url.clone(), key, config).map(Some)
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Override the retry backoff (tests).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn send_once<T: DeserializeOwned>(&self, url: &str, body: Option<&Value>) -> Result<T> {
        let request = match body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };
        let response = request
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| NeoLabsError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NeoLabsError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| NeoLabsError::Research(format!("{url}: invalid response: {e}")))
    }

    async fn send<T: DeserializeOwned>(&self, label: &str, url: &str, body: Option<&Value>) -> Result<T> {
        retry_once(label, self.backoff, || self.send_once(url, body)).await
    }

    /// Research every company. Each id maps to its result, or `None` when
    /// the run did not complete or returned nothing usable.
    ///
    /// Only a failed submission is an error.
    #[instrument(skip_all, fields(companies = companies.len()))]
    pub async fn research(
        &self,
        companies: &[KnownCompany],
    ) -> Result<HashMap<String, Option<ResearchResult>>> {
        let mut results: HashMap<String, Option<ResearchResult>> =
            companies.iter().map(|c| (c.id.clone(), None)).collect();
        if companies.is_empty() {
            return Ok(results);
        }

        let mut state = self.submit(companies).await?;
        while !state.is_terminal() {
            state = self.advance(state).await;
            debug!(state = state.name(), "research batch state");
        }

        let run_ids = match state {
            ResearchState::Completed { run_ids } => run_ids,
            ResearchState::TimedOut { run_ids } => {
                warn!(attempts = self.max_poll_attempts, "research batch still active, collecting finished runs");
                run_ids
            }
            ResearchState::Failed { run_ids, reason } => {
                warn!(%reason, "research polling failed, collecting finished runs");
                run_ids
            }
            ResearchState::Submitted { .. } | ResearchState::Polling { .. } => Vec::new(),
        };

        for run_id in &run_ids {
            match self.fetch_result(run_id).await {
                Ok(Some((company_id, result))) => {
                    if let Some(slot) = results.get_mut(&company_id) {
                        *slot = Some(result);
                    } else {
                        warn!(%run_id, %company_id, "result for unknown company, ignoring");
                    }
                }
                Ok(None) => debug!(%run_id, "run not completed"),
                Err(e) => warn!(%run_id, error = %e, "failed to fetch run result"),
            }
        }

        let found = results.values().filter(|r| r.is_some()).count();
        info!(found, missing = results.len() - found, "research batch finished");
        Ok(results)
    }

    async fn submit(&self, companies: &[KnownCompany]) -> Result<ResearchState> {
        let url = format!("{}/v1beta/tasks/groups", self.base_url);
        let created: CreateGroupResponse = self.send("create task group", &url, Some(&json!({}))).await?;
        let group_id = created
            .taskgroup_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| NeoLabsError::Research("provider did not return taskgroup_id".into()))?;

        let inputs: Vec<RunInput<'_>> = companies
            .iter()
            .map(|company| RunInput {
                processor: &self.processor,
                input: CompanyInput {
                    company_id: &company.id,
                    company_name: &company.name,
                    company_website: company.website_url.as_deref(),
                },
            })
            .collect();
        let body = json!({
            "default_task_spec": {
                "input_schema": input_schema(),
                "output_schema": output_schema(),
            },
            "inputs": inputs,
        });

        let url = format!("{}/v1beta/tasks/groups/{group_id}/runs", self.base_url);
        let added: AddRunsResponse = self.send("add task runs", &url, Some(&body)).await?;
        info!(%group_id, runs = added.run_ids.len(), "research batch submitted");

        Ok(ResearchState::Submitted {
            group_id,
            run_ids: added.run_ids,
        })
    }

    /// One state transition.
    pub async fn advance(&self, state: ResearchState) -> ResearchState {
        match state {
            ResearchState::Submitted { group_id, run_ids } => ResearchState::Polling {
                group_id,
                run_ids,
                attempt: 0,
            },
            ResearchState::Polling {
                group_id,
                run_ids,
                attempt,
            } => {
                if attempt >= self.max_poll_attempts {
                    return ResearchState::TimedOut { run_ids };
                }
                let url = format!("{}/v1beta/tasks/groups/{group_id}", self.base_url);
                match self.send::<GroupResponse>("get task group", &url, None).await {
                    Ok(group) if !group.status.as_ref().is_some_and(|s| s.is_active) => {
                        ResearchState::Completed { run_ids }
                    }
                    Ok(_) => {
                        self.sleeper.sleep(self.poll_interval).await;
                        ResearchState::Polling {
                            group_id,
                            run_ids,
                            attempt: attempt + 1,
                        }
                    }
                    Err(e) => ResearchState::Failed {
                        run_ids,
                        reason: e.to_string(),
                    },
                }
            }
            terminal => terminal,
        }
    }

    /// Completed run result keyed by the echoed company id.
    async fn fetch_result(&self, run_id: &str) -> Result<Option<(String, ResearchResult)>> {
        let url = format!("{}/v1/tasks/runs/{run_id}/result?timeout=30", self.base_url);
        let response: RunResultResponse = self.send("get run result", &url, None).await?;

        if response.run.and_then(|r| r.status).as_deref() != Some("completed") {
            return Ok(None);
        }
        let Some(output) = response.output else {
            return Ok(None);
        };
        let Some(content) = output.content else {
            return Ok(None);
        };
        let content: CompanyProfile = serde_json::from_value(content)
            .map_err(|e| NeoLabsError::Research(format!("run {run_id}: malformed content: {e}")))?;
        let Some(company_id) = content.company_id.clone().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let basis = match output.basis {
            Some(raw) => serde_json::from_value::<Vec<FieldBasis>>(raw).unwrap_or_else(|e| {
                debug!(%run_id, error = %e, "ignoring malformed basis");
                Vec::new()
            }),
            None => Vec::new(),
        };

        Ok(Some((company_id, ResearchResult { content, basis })))
    }
}

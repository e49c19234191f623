//! Application configuration for NeoLabs.
//!
//! User config lives at `~/.neolabs/neolabs.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NeoLabsError, Result};
use crate::url::DomainPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "neolabs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".neolabs";

/// Collected sources needed before query search is skipped.
pub const MIN_SOURCES_BEFORE_SEARCH: usize = 6;

// ---------------------------------------------------------------------------
// Run modes
// ---------------------------------------------------------------------------

/// Collection profile; picks lookback and search defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestProfile {
    #[default]
    Weekly,
    Benchmark,
    Custom,
}

impl IngestProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Benchmark => "benchmark",
            Self::Custom => "custom",
        }
    }

    /// Lookback window used when none is configured.
    pub fn default_lookback_days(&self) -> u32 {
        match self {
            Self::Weekly => 7,
            Self::Benchmark => 365,
            Self::Custom => 14,
        }
    }
}

/// How the curated seed universe participates in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    #[default]
    Off,
    Bootstrap,
    Always,
}

impl SeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Bootstrap => "bootstrap",
            Self::Always => "always",
        }
    }
}

/// Entity resolution strategy for article pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Heuristics only.
    #[default]
    Off,
    /// Heuristics first, LLM when they are empty or suspicious.
    Hybrid,
    /// LLM first, heuristics when it yields nothing.
    Llm,
}

impl ResolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Hybrid => "hybrid",
            Self::Llm => "llm",
        }
    }
}

macro_rules! parse_mode {
    ($ty:ty, $label:literal, [$($text:literal => $variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = NeoLabsError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(NeoLabsError::validation(format!(
                        concat!("unknown ", $label, " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

parse_mode!(IngestProfile, "profile", [
    "weekly" => IngestProfile::Weekly,
    "benchmark" => IngestProfile::Benchmark,
    "custom" => IngestProfile::Custom,
]);
parse_mode!(SeedMode, "seed mode", [
    "off" => SeedMode::Off,
    "bootstrap" => SeedMode::Bootstrap,
    "always" => SeedMode::Always,
]);
parse_mode!(ResolutionMode, "resolution mode", [
    "off" => ResolutionMode::Off,
    "hybrid" => ResolutionMode::Hybrid,
    "llm" => ResolutionMode::Llm,
]);

/// Search provider topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTopic {
    General,
    News,
}

/// Search provider depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

/// Resolved search request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchSettings {
    pub topic: SearchTopic,
    pub depth: SearchDepth,
    pub max_results: u32,
}

impl SearchSettings {
    /// Profile defaults: broad and deep for weekly/benchmark, news-only otherwise.
    pub fn for_profile(profile: IngestProfile) -> Self {
        match profile {
            IngestProfile::Weekly | IngestProfile::Benchmark => Self {
                topic: SearchTopic::General,
                depth: SearchDepth::Advanced,
                max_results: 10,
            },
            IngestProfile::Custom => Self {
                topic: SearchTopic::News,
                depth: SearchDepth::Basic,
                max_results: 5,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config structs (matching neolabs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Search provider (Tavily).
    #[serde(default)]
    pub search: SearchConfig,

    /// LLM fallback for entity resolution (Mistral).
    #[serde(default)]
    pub llm: LlmConfig,

    /// Deep-research task provider (Parallel).
    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub benchmark: BenchmarkConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub profile: IngestProfile,

    /// Lookback window in days; 0 means the profile default.
    #[serde(default)]
    pub lookback_days: u32,

    #[serde(default)]
    pub seed_mode: SeedMode,

    #[serde(default)]
    pub entity_resolution: ResolutionMode,

    /// Search allow-listed restatements of stories from unlisted hosts.
    #[serde(default = "default_true")]
    pub allowlist_followup: bool,

    #[serde(default = "default_followup_max_results")]
    pub followup_max_results: u32,

    /// Follow-up queries derived from one search result.
    #[serde(default = "default_followup_max_queries")]
    pub followup_max_queries: usize,

    /// Follow-up queries per run.
    #[serde(default = "default_followup_max_total")]
    pub followup_max_total: usize,

    /// Run query search even when feeds and pages found enough sources.
    #[serde(default)]
    pub force_search: bool,

    #[serde(default = "default_max_sources_to_parse")]
    pub max_sources_to_parse: usize,

    #[serde(default = "default_max_discovery_links")]
    pub max_discovery_links_per_page: usize,

    /// Concurrent page fetches while building candidates.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Cap on known companies searched or refreshed per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_max: Option<usize>,

    #[serde(default = "default_query_limit")]
    pub known_query_limit: usize,

    /// Cap on seed names searched per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_max: Option<usize>,

    #[serde(default = "default_query_limit")]
    pub seed_query_limit: usize,

    /// Where the JSON ingest report is written.
    #[serde(default = "default_report_path")]
    pub report_path: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            profile: IngestProfile::default(),
            lookback_days: 0,
            seed_mode: SeedMode::default(),
            entity_resolution: ResolutionMode::default(),
            allowlist_followup: true,
            followup_max_results: default_followup_max_results(),
            followup_max_queries: default_followup_max_queries(),
            followup_max_total: default_followup_max_total(),
            force_search: false,
            max_sources_to_parse: default_max_sources_to_parse(),
            max_discovery_links_per_page: default_max_discovery_links(),
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            known_max: None,
            known_query_limit: default_query_limit(),
            seed_max: None,
            seed_query_limit: default_query_limit(),
            report_path: default_report_path(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_followup_max_results() -> u32 {
    3
}
fn default_followup_max_queries() -> usize {
    2
}
fn default_followup_max_total() -> usize {
    20
}
fn default_max_sources_to_parse() -> usize {
    400
}
fn default_max_discovery_links() -> usize {
    120
}
fn default_concurrency() -> usize {
    4
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_query_limit() -> usize {
    1
}
fn default_report_path() -> String {
    "artifacts/ingest-report.json".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Overrides the profile's topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<SearchTopic>,

    /// Overrides the profile's depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<SearchDepth>,

    /// Overrides the profile's result count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            base_url: default_search_base_url(),
            topic: None,
            depth: None,
            max_results: None,
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_search_base_url() -> String {
    "https://api.tavily.com".into()
}
fn default_search_timeout() -> u64 {
    20
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_key_env() -> String {
    "MISTRAL_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://api.mistral.ai".into()
}
fn default_llm_model() -> String {
    "mistral-large-latest".into()
}
fn default_llm_timeout() -> u64 {
    15
}

/// `[research]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default = "default_research_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_research_base_url")]
    pub base_url: String,

    #[serde(default = "default_processor")]
    pub processor: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_research_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_research_key_env(),
            base_url: default_research_base_url(),
            processor: default_processor(),
            poll_interval_secs: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            timeout_secs: default_research_timeout(),
        }
    }
}

fn default_research_key_env() -> String {
    "PARALLEL_API_KEY".into()
}
fn default_research_base_url() -> String {
    "https://api.parallel.ai".into()
}
fn default_processor() -> String {
    "core".into()
}
fn default_poll_interval() -> u64 {
    5
}
fn default_max_poll_attempts() -> u32 {
    240
}
fn default_research_timeout() -> u64 {
    30
}

/// `[sources]` section: where candidates are collected from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<String>,

    #[serde(default = "default_discovery_pages")]
    pub discovery_pages: Vec<String>,

    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,

    #[serde(default = "default_denied_domains")]
    pub denied_domains: Vec<String>,

    /// Startup directory sites (subset of the allowed list).
    #[serde(default = "default_directory_domains")]
    pub directory_domains: Vec<String>,

    #[serde(default = "default_queries")]
    pub queries: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            discovery_pages: default_discovery_pages(),
            allowed_domains: default_allowed_domains(),
            denied_domains: default_denied_domains(),
            directory_domains: default_directory_domains(),
            queries: default_queries(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_feeds() -> Vec<String> {
    strings(&[
        "https://techcrunch.com/feed/",
        "https://techcrunch.com/tag/artificial-intelligence/feed/",
        "https://feeds.venturebeat.com/VentureBeat",
        "https://feeds.venturebeat.com/topstories",
        "https://venturebeat.com/category/ai/feed/",
        "https://www.wired.com/feed/tag/ai/latest/rss",
    ])
}
fn default_discovery_pages() -> Vec<String> {
    strings(&[
        "https://a16z.com/news-content/",
        "https://a16z.com/portfolio/",
        "https://www.indexventures.com/perspectives/",
        "https://www.sequoiacap.com/stories/",
    ])
}
fn default_allowed_domains() -> Vec<String> {
    strings(&[
        "techcrunch.com",
        "venturebeat.com",
        "wired.com",
        "axios.com",
        "a16z.com",
        "indexventures.com",
        "sequoiacap.com",
        "wikipedia.org",
        "seedtable.com",
        "topstartups.io",
        "nfx.com",
        "startupblink.com",
        "failory.com",
        "wellfound.com",
    ])
}
fn default_denied_domains() -> Vec<String> {
    strings(&[
        "theinformation.com",
        "ft.com",
        "wsj.com",
        "bloomberg.com",
        "nytimes.com",
        "economist.com",
        "linkedin.com",
        "x.com",
        "twitter.com",
        "medium.com",
    ])
}
fn default_directory_domains() -> Vec<String> {
    strings(&[
        "seedtable.com",
        "topstartups.io",
        "nfx.com",
        "startupblink.com",
        "failory.com",
        "wellfound.com",
    ])
}
fn default_queries() -> Vec<String> {
    strings(&[
        "AI research lab startup seed round",
        "new AI lab startup raised seed",
        "stealth AI lab founded by former OpenAI DeepMind",
        "AI institute startup funding",
        "research lab AI startup announced",
        "AI safety lab startup",
        "AGI research lab startup",
        "foundation model lab startup",
        "frontier model research lab",
        "research institute AI startup",
        "AI lab emerges from stealth",
        "research lab startup",
        "new research lab startup",
        "research lab startup funding",
        "research lab startup seed round",
        "lab startup raised seed",
        "lab startup emerges from stealth",
        "new lab startup announced",
    ])
}

/// `[benchmark]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Known-good names, oldest first.
    #[serde(default = "default_known_list")]
    pub known_list: String,

    /// Curated seed names for bootstrap runs.
    #[serde(default = "default_seed_universe")]
    pub seed_universe: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            known_list: default_known_list(),
            seed_universe: default_seed_universe(),
        }
    }
}

fn default_known_list() -> String {
    "benchmarks/known-neolabs.txt".into()
}
fn default_seed_universe() -> String {
    "benchmarks/seed-universe.txt".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file; required unless dry-running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Ingest settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime ingestion settings, built once per process and passed by reference.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub profile: IngestProfile,
    /// Explicit lookback; 0 means the profile default.
    pub lookback_override: u32,
    search_override: (Option<SearchTopic>, Option<SearchDepth>, Option<u32>),
    pub seed_mode: SeedMode,
    pub entity_resolution: ResolutionMode,
    pub allowlist_followup: bool,
    pub followup_max_results: u32,
    pub followup_max_queries: usize,
    pub followup_max_total: usize,
    pub force_search: bool,
    pub max_sources_to_parse: usize,
    pub max_discovery_links_per_page: usize,
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub known_max: Option<usize>,
    pub known_query_limit: usize,
    pub seed_max: Option<usize>,
    pub seed_query_limit: usize,
    pub report_path: PathBuf,
    /// Markdown summary sink (CI step summary).
    pub step_summary_path: Option<PathBuf>,
    pub dry_run: bool,
    pub database_path: Option<PathBuf>,
    pub feeds: Vec<String>,
    pub discovery_pages: Vec<String>,
    pub queries: Vec<String>,
    pub domains: DomainPolicy,
    pub directory_domains: Vec<String>,
}

impl IngestSettings {
    /// Effective lookback window in days.
    pub fn lookback_days(&self) -> u32 {
        if self.lookback_override > 0 {
            self.lookback_override
        } else {
            self.profile.default_lookback_days()
        }
    }

    /// Effective search parameters: profile defaults with config overrides.
    pub fn search(&self) -> SearchSettings {
        let defaults = SearchSettings::for_profile(self.profile);
        let (topic, depth, max_results) = self.search_override;
        SearchSettings {
            topic: topic.unwrap_or(defaults.topic),
            depth: depth.unwrap_or(defaults.depth),
            max_results: max_results.filter(|n| *n > 0).unwrap_or(defaults.max_results),
        }
    }

    /// Database path for a persisting run; a missing path is fatal.
    pub fn require_database_path(&self) -> Result<&Path> {
        self.database_path.as_deref().ok_or_else(|| {
            NeoLabsError::config(
                "a database path is required; set [storage].database_path or pass --db",
            )
        })
    }
}

impl From<&AppConfig> for IngestSettings {
    fn from(config: &AppConfig) -> Self {
        let ingest = &config.ingest;
        Self {
            profile: ingest.profile,
            lookback_override: ingest.lookback_days,
            search_override: (
                config.search.topic,
                config.search.depth,
                config.search.max_results,
            ),
            seed_mode: ingest.seed_mode,
            entity_resolution: ingest.entity_resolution,
            allowlist_followup: ingest.allowlist_followup,
            followup_max_results: ingest.followup_max_results,
            followup_max_queries: ingest.followup_max_queries,
            followup_max_total: ingest.followup_max_total,
            force_search: ingest.force_search,
            max_sources_to_parse: ingest.max_sources_to_parse,
            max_discovery_links_per_page: ingest.max_discovery_links_per_page,
            concurrency: ingest.concurrency.max(1),
            fetch_timeout: Duration::from_secs(ingest.fetch_timeout_secs),
            known_max: ingest.known_max.filter(|n| *n > 0),
            known_query_limit: ingest.known_query_limit.max(1),
            seed_max: ingest.seed_max.filter(|n| *n > 0),
            seed_query_limit: ingest.seed_query_limit.max(1),
            report_path: PathBuf::from(&ingest.report_path),
            step_summary_path: None,
            dry_run: false,
            database_path: config.storage.database_path.as_ref().map(PathBuf::from),
            feeds: config.sources.feeds.clone(),
            discovery_pages: config.sources.discovery_pages.clone(),
            queries: config.sources.queries.clone(),
            domains: DomainPolicy::new(
                config.sources.allowed_domains.clone(),
                config.sources.denied_domains.clone(),
            ),
            directory_domains: config.sources.directory_domains.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.neolabs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| NeoLabsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.neolabs/neolabs.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NeoLabsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| NeoLabsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NeoLabsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| NeoLabsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NeoLabsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

// ---------------------------------------------------------------------------
// Provider keys
// ---------------------------------------------------------------------------

/// API keys for the external providers, resolved once by the binary from
/// the variables each config section names. A `None` key disables its
/// provider.
#[derive(Clone, Default)]
pub struct ProviderKeys {
    pub search: Option<String>,
    pub llm: Option<String>,
    pub research: Option<String>,
}

impl ProviderKeys {
    /// Resolve every key variable through `lookup`; blank values count as missing.
    pub fn resolve(config: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let key = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            search: key(&config.search.api_key_env),
            llm: key(&config.llm.api_key_env),
            research: key(&config.research.api_key_env),
        }
    }
}

impl fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("search", &self.search.is_some())
            .field("llm", &self.llm.is_some())
            .field("research", &self.research.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("TAVILY_API_KEY"));
        assert!(toml_str.contains("mistral-large-latest"));
        assert!(toml_str.contains("techcrunch.com"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.ingest.max_sources_to_parse, 400);
        assert_eq!(parsed.sources.queries.len(), 18);
        assert_eq!(parsed.research.max_poll_attempts, 240);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[ingest]
profile = "custom"
seed_mode = "always"
known_max = 5

[storage]
database_path = "/tmp/neolabs.db"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.ingest.profile, IngestProfile::Custom);
        assert_eq!(config.ingest.seed_mode, SeedMode::Always);
        assert_eq!(config.ingest.known_max, Some(5));
        assert_eq!(config.ingest.concurrency, 4);
        assert_eq!(config.llm.timeout_secs, 15);
    }

    #[test]
    fn lookback_follows_profile() {
        let mut settings = IngestSettings::from(&AppConfig::default());
        assert_eq!(settings.lookback_days(), 7);
        settings.profile = IngestProfile::Benchmark;
        assert_eq!(settings.lookback_days(), 365);
        settings.profile = IngestProfile::Custom;
        assert_eq!(settings.lookback_days(), 14);
        settings.lookback_override = 30;
        assert_eq!(settings.lookback_days(), 30);
    }

    #[test]
    fn search_settings_merge_overrides() {
        let mut config = AppConfig::default();
        config.ingest.profile = IngestProfile::Custom;
        let settings = IngestSettings::from(&config);
        assert_eq!(
            settings.search(),
            SearchSettings {
                topic: SearchTopic::News,
                depth: SearchDepth::Basic,
                max_results: 5
            }
        );

        config.search.depth = Some(SearchDepth::Advanced);
        config.search.max_results = Some(8);
        let settings = IngestSettings::from(&config);
        assert_eq!(settings.search().depth, SearchDepth::Advanced);
        assert_eq!(settings.search().max_results, 8);
        assert_eq!(settings.search().topic, SearchTopic::News);
    }

    #[test]
    fn missing_database_path_is_config_error() {
        let settings = IngestSettings::from(&AppConfig::default());
        let err = settings.require_database_path().unwrap_err();
        assert!(matches!(err, NeoLabsError::Config { .. }));
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("Bootstrap".parse::<SeedMode>().unwrap(), SeedMode::Bootstrap);
        assert_eq!("HYBRID".parse::<ResolutionMode>().unwrap(), ResolutionMode::Hybrid);
        assert_eq!(IngestProfile::Benchmark.to_string(), "benchmark");
        assert!("daily".parse::<IngestProfile>().is_err());
    }

    #[test]
    fn provider_keys_use_configured_names() {
        let mut config = AppConfig::default();
        config.llm.api_key_env = "CUSTOM_LLM_KEY".into();
        let keys = ProviderKeys::resolve(&config, |name| match name {
            "TAVILY_API_KEY" => Some("tvly-1".into()),
            "CUSTOM_LLM_KEY" => Some("  ".into()),
            "PARALLEL_API_KEY" => Some("par-1".into()),
            _ => None,
        });
        assert_eq!(keys.search.as_deref(), Some("tvly-1"));
        assert_eq!(keys.llm, None, "blank keys count as missing");
        assert_eq!(keys.research.as_deref(), Some("par-1"));
        assert!(!format!("{keys:?}").contains("tvly-1"));
    }
}

//! Shared types, error model, and configuration for NeoLabs.
//!
//! This crate is the foundation depended on by all other NeoLabs crates.
//! It provides:
//! - [`NeoLabsError`]: the unified error type
//! - Domain types ([`Source`], [`Candidate`], [`KnownCompany`], [`FundingRound`])
//! - Configuration ([`AppConfig`], [`IngestSettings`], config loading)
//! - URL canonicalisation, name normalisation and relevance scoring

pub mod config;
pub mod error;
pub mod normalize;
pub mod relevance;
pub mod retry;
pub mod title;
pub mod types;
pub mod url;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BenchmarkConfig, IngestConfig, IngestProfile, IngestSettings, LlmConfig,
    MIN_SOURCES_BEFORE_SEARCH, ProviderKeys, ResearchConfig, ResolutionMode, SearchConfig, SearchDepth,
    SearchSettings, SearchTopic, SeedMode, SourcesConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{NeoLabsError, Result};
pub use normalize::{collapse_whitespace, max_time, merge_aliases, normalize_name, parse_name_list};
pub use relevance::{Relevance, is_likely_company_name, score};
pub use retry::{RETRY_BACKOFF, retry_once};
pub use title::company_name_from_title;
pub use types::{
    Candidate, CandidateCollection, CompanyStatus, FundingRound, KnownCompany, Person,
    RefreshUpdate, Source, SourceKind, SourceOrigin, SourcePipeline, VALUATION_ROUND_TYPE,
};
pub use crate::url::{DomainPolicy, host_matches, hostname, normalize_url};

//! Pipeline orchestration and domain logic for NeoLabs.
//!
//! This crate turns collected sources into candidate companies (entity
//! resolution, merging), persists them, measures recall against a benchmark
//! list, and keeps stored companies current through deep research.

pub mod benchmark;
pub mod candidates;
pub mod llm;
pub mod merge;
pub mod pipeline;
pub mod refresh;
pub mod report;
pub mod research;
pub mod resolver;

pub use benchmark::{BenchmarkComparison, compare, load_name_list, normalize_for_comparison};
pub use candidates::{CandidateBuilder, MIN_CANDIDATE_SCORE};
pub use llm::{LlmFallback, MistralClient, NameQuery};
pub use merge::{merge_candidates, unique_name_count};
pub use pipeline::{
    IngestOutcome, IngestSummary, NameLists, ProgressReporter, Providers, RefreshSummary, RunPlan,
    SilentProgress, ingest_candidates, run_ingest, run_refresh,
};
pub use refresh::{Reconciliation, reconcile};
pub use report::IngestReport;
pub use research::{ParallelClient, ResearchProvider, ResearchResult, ResearchState, Sleeper, TokioSleeper};
pub use resolver::{EntityResolver, Resolution, ResolutionPath, ResolverInput};

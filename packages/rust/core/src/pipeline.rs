//! End-to-end pipelines: `ingest` (collect → build → merge → persist →
//! compare → report) and `refresh` (research → reconcile → persist).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use neolabs_crawler::Fetcher;
use neolabs_discovery::{Collector, SearchProvider, TavilyClient};
use neolabs_shared::{
    AppConfig, Candidate, CandidateCollection, IngestProfile, IngestSettings, KnownCompany,
    NeoLabsError, ProviderKeys, Result, SeedMode, SourceKind,
};
use neolabs_storage::{Repository, SourceIds};

use crate::benchmark::compare;
use crate::candidates::CandidateBuilder;
use crate::llm::{LlmFallback, MistralClient};
use crate::merge::merge_candidates;
use crate::refresh::reconcile;
use crate::report::IngestReport;
use crate::research::{ResearchProvider, ResearchResult};
use crate::resolver::EntityResolver;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a ranked source has been turned into candidates.
    fn source_parsed(&self, url: &str, current: usize, total: usize);
    /// Called when the ingest pipeline completes.
    fn done(&self, outcome: &IngestOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_parsed(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &IngestOutcome) {}
}

// ---------------------------------------------------------------------------
// Providers and inputs
// ---------------------------------------------------------------------------

/// External collaborators for one ingest run.
#[derive(Clone)]
pub struct Providers {
    pub fetcher: Fetcher,
    /// `None` when the search key is unset.
    pub search: Option<Arc<dyn SearchProvider>>,
    /// `None` when the LLM key is unset.
    pub llm: Option<Arc<dyn LlmFallback>>,
}

impl Providers {
    /// Clients for every provider with a key in `keys`.
    pub fn from_config(config: &AppConfig, settings: &IngestSettings, keys: &ProviderKeys) -> Result<Self> {
        let search = TavilyClient::from_config(&config.search, keys.search.as_deref())?
            .map(|client| Arc::new(client) as Arc<dyn SearchProvider>);
        let llm = MistralClient::from_config(&config.llm, keys.llm.as_deref())?
            .map(|client| Arc::new(client) as Arc<dyn LlmFallback>);
        Ok(Self {
            fetcher: Fetcher::new(settings.fetch_timeout)?,
            search,
            llm,
        })
    }
}

/// Name lists read from disk by the caller.
#[derive(Debug, Clone, Default)]
pub struct NameLists {
    /// Benchmark names, oldest first.
    pub benchmark: Vec<String>,
    /// Seed universe for `seed_bootstrap`.
    pub seeds: Vec<String>,
}

/// Which collection strategies a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub known_updates: bool,
    pub new_discovery: bool,
    pub seed_universe: bool,
}

impl RunPlan {
    pub fn for_settings(settings: &IngestSettings) -> Self {
        let seed_always = settings.seed_mode == SeedMode::Always;
        if settings.dry_run {
            Self {
                known_updates: false,
                new_discovery: true,
                seed_universe: seed_always,
            }
        } else if settings.profile == IngestProfile::Weekly {
            Self {
                known_updates: true,
                new_discovery: false,
                seed_universe: false,
            }
        } else if settings.seed_mode == SeedMode::Bootstrap {
            Self {
                known_updates: false,
                new_discovery: false,
                seed_universe: true,
            }
        } else {
            Self {
                known_updates: true,
                new_discovery: true,
                seed_universe: seed_always,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// Persistence tallies for one ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub companies_created: usize,
    pub companies_updated: usize,
    pub sources_upserted: usize,
    pub company_sources_linked: usize,
    pub people_upserted: usize,
    pub funding_rounds_upserted: usize,
    pub failures: usize,
}

/// Result of [`run_ingest`].
#[derive(Debug)]
pub struct IngestOutcome {
    pub plan: RunPlan,
    pub candidates: Vec<Candidate>,
    /// `None` on dry runs.
    pub summary: Option<IngestSummary>,
    pub report: IngestReport,
    pub elapsed: Duration,
}

/// Run the ingest pipeline.
///
/// `repo` is required unless `settings.dry_run`; it is not touched on dry
/// runs.
#[instrument(skip_all, fields(
    profile = settings.profile.as_str(),
    seed_mode = settings.seed_mode.as_str(),
    dry_run = settings.dry_run
))]
pub async fn run_ingest(
    settings: &IngestSettings,
    providers: &Providers,
    repo: Option<&dyn Repository>,
    lists: &NameLists,
    progress: &dyn ProgressReporter,
) -> Result<IngestOutcome> {
    let start = Instant::now();
    let repo = match (settings.dry_run, repo) {
        (true, _) => None,
        (false, Some(repo)) => Some(repo),
        (false, None) => {
            return Err(NeoLabsError::config(
                "a database is required unless running dry (--dry-run or compare)",
            ));
        }
    };

    let plan = RunPlan::for_settings(settings);
    info!(
        lookback_days = settings.lookback_days(),
        known_updates = plan.known_updates,
        new_discovery = plan.new_discovery,
        seed_universe = plan.seed_universe,
        "starting ingest"
    );

    let collector = Collector::new(settings, providers.fetcher.clone(), providers.search.clone());
    let mut collection = CandidateCollection::default();

    // --- Known updates ---
    if let (true, Some(repo)) = (plan.known_updates, repo) {
        progress.phase("Searching for known-company updates");
        let companies = repo.list_companies().await?;
        if companies.is_empty() {
            warn!("no stored companies; known-company updates have nothing to search");
        }
        collection.extend(collector.collect_known_updates(&companies).await);
    }

    // --- New discovery ---
    if plan.new_discovery {
        progress.phase("Collecting sources");
        let discovered = collector.collect_new_discovery().await;

        progress.phase("Resolving companies");
        let resolver = EntityResolver::new(settings.entity_resolution, providers.llm.clone());
        let builder = CandidateBuilder::new(settings, providers.fetcher.clone(), resolver);
        let candidates = builder.build_all(&discovered.to_parse, progress).await;
        info!(
            parsed = discovered.to_parse.len(),
            candidates = candidates.len(),
            "new-discovery candidates built"
        );
        collection.extend(CandidateCollection {
            candidates,
            sources: discovered.collected,
        });
    }

    // --- Seed universe ---
    if plan.seed_universe {
        progress.phase("Searching seed universe");
        if lists.seeds.is_empty() {
            warn!("seed universe is empty");
        }
        collection.extend(collector.collect_seed_universe(&lists.seeds).await);
    }

    // --- Merge ---
    progress.phase("Merging candidates");
    let collected = collection.candidates.len();
    let candidates = merge_candidates(collection.candidates);
    info!(collected, merged = candidates.len(), "candidates merged");

    // --- Persist ---
    let summary = match repo {
        Some(repo) => {
            progress.phase("Saving companies");
            Some(ingest_candidates(repo, &candidates).await)
        }
        None => None,
    };

    // --- Compare and report ---
    progress.phase("Writing report");
    let names: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
    let comparison = compare(&names, &lists.benchmark);
    let report = IngestReport::build(settings, &comparison, &candidates, &collection.sources, Utc::now());
    report.write(&settings.report_path)?;
    if let Some(path) = &settings.step_summary_path {
        if let Err(e) = report.append_step_summary(path) {
            warn!(path = %path.display(), error = %e, "step summary not written");
        }
    }

    let outcome = IngestOutcome {
        plan,
        candidates,
        summary,
        report,
        elapsed: start.elapsed(),
    };
    info!(
        candidates = outcome.candidates.len(),
        matched = outcome.report.benchmark.matched_count,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "ingest complete"
    );
    progress.done(&outcome);
    Ok(outcome)
}

/// Persist merged candidates: every distinct source first, then each
/// company with its links, people and funding rounds.
///
/// A failing candidate is logged and counted; the rest still go through.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub async fn ingest_candidates(repo: &dyn Repository, candidates: &[Candidate]) -> IngestSummary {
    let mut summary = IngestSummary::default();

    let mut source_ids = SourceIds::new();
    for source in candidates.iter().flat_map(|c| &c.sources) {
        if source_ids.contains_key(&source.url) {
            continue;
        }
        match repo.upsert_source(source).await {
            Ok(outcome) => {
                source_ids.insert(source.url.clone(), outcome.id);
                summary.sources_upserted += 1;
            }
            Err(e) => {
                warn!(url = %source.url, error = %e, "source upsert failed");
                summary.failures += 1;
            }
        }
    }

    for candidate in candidates {
        if let Err(e) = ingest_one(repo, candidate, &source_ids, &mut summary).await {
            warn!(name = %candidate.name, error = %e, "candidate ingest failed");
            summary.failures += 1;
        }
    }

    info!(
        created = summary.companies_created,
        updated = summary.companies_updated,
        sources = summary.sources_upserted,
        links = summary.company_sources_linked,
        failures = summary.failures,
        "candidates ingested"
    );
    summary
}

async fn ingest_one(
    repo: &dyn Repository,
    candidate: &Candidate,
    source_ids: &SourceIds,
    summary: &mut IngestSummary,
) -> Result<()> {
    let company = repo.upsert_company(candidate).await?;
    if company.created {
        summary.companies_created += 1;
    } else {
        summary.companies_updated += 1;
    }

    for source in &candidate.sources {
        let Some(source_id) = source_ids.get(&source.url) else {
            continue;
        };
        if repo.link_company_source(&company.id, source_id, source.kind).await? {
            summary.company_sources_linked += 1;
        }
    }

    if !candidate.people.is_empty() {
        summary.people_upserted += repo.upsert_people(&company.id, &candidate.people, source_ids).await?;
    }
    if !candidate.funding_rounds.is_empty() {
        summary.funding_rounds_upserted += repo
            .upsert_funding_rounds(&company.id, &candidate.funding_rounds, source_ids)
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// Tallies for one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub requested: usize,
    pub updated: usize,
    /// Companies the provider returned nothing for.
    pub missing: usize,
    pub failed: usize,
}

/// Research the `limit` least recently verified companies and reconcile
/// the results into storage.
#[instrument(skip_all, fields(provider = provider.name(), limit = ?limit))]
pub async fn run_refresh(
    repo: &dyn Repository,
    provider: &dyn ResearchProvider,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<RefreshSummary> {
    progress.phase("Loading companies");
    let mut companies = repo.list_companies().await?;
    if let Some(limit) = limit {
        companies.truncate(limit);
    }

    let mut summary = RefreshSummary {
        requested: companies.len(),
        ..RefreshSummary::default()
    };
    if companies.is_empty() {
        warn!("no stored companies to refresh");
        return Ok(summary);
    }

    progress.phase("Researching companies");
    let results = match provider.research(&companies).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "research batch failed");
            summary.failed = summary.requested;
            return Ok(summary);
        }
    };

    progress.phase("Reconciling results");
    let now = Utc::now();
    for company in &companies {
        let Some(Some(result)) = results.get(&company.id) else {
            summary.missing += 1;
            continue;
        };
        match apply_refresh(repo, company, result, now).await {
            Ok(()) => summary.updated += 1,
            Err(e) => {
                warn!(company = %company.name, error = %e, "refresh update failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        requested = summary.requested,
        updated = summary.updated,
        missing = summary.missing,
        failed = summary.failed,
        "refresh complete"
    );
    Ok(summary)
}

async fn apply_refresh(
    repo: &dyn Repository,
    company: &KnownCompany,
    result: &ResearchResult,
    now: DateTime<Utc>,
) -> Result<()> {
    let reconciled = reconcile(company, result, now);
    repo.update_company_from_refresh(&company.id, &reconciled.update).await?;

    let mut source_ids = SourceIds::new();
    for source in &reconciled.sources {
        let stored = repo.upsert_source(source).await?;
        repo.link_company_source(&company.id, &stored.id, SourceKind::Overview)
            .await?;
        source_ids.insert(source.url.clone(), stored.id);
    }

    if !reconciled.funding_rounds.is_empty() {
        repo.upsert_funding_rounds(&company.id, &reconciled.funding_rounds, &source_ids)
            .await?;
    }
    Ok(())
}

//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use neolabs_core::pipeline::{
    IngestOutcome, NameLists, ProgressReporter, Providers, RunPlan, run_ingest, run_refresh,
};
use neolabs_core::{ParallelClient, load_name_list};
use neolabs_shared::{
    AppConfig, IngestProfile, IngestSettings, ProviderKeys, ResolutionMode, SeedMode, init_config,
    load_config,
};
use neolabs_storage::{Repository, Storage};

/// CI step-summary sink, read by the CLI only.
const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// NeoLabs: discover newly founded AI labs and keep them current.
#[derive(Parser)]
#[command(
    name = "neolabs",
    version,
    about = "Discover newly founded AI research labs, track them, and measure recall.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Collect sources, resolve companies, store them and write a report.
    Ingest(IngestArgs),

    /// Collect and report without touching the database (ingest --dry-run).
    Compare(IngestArgs),

    /// Re-research stored companies and reconcile the results.
    Refresh {
        /// Database path (overrides [storage].database_path).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Refresh at most this many companies, least recently verified first.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List stored companies.
    List {
        /// Database path (overrides [storage].database_path).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags shared by `ingest` and `compare`.
#[derive(Args, Debug, Default)]
pub(crate) struct IngestArgs {
    /// Collection profile: weekly, benchmark or custom.
    #[arg(long)]
    pub profile: Option<IngestProfile>,

    /// Lookback window in days (0 keeps the profile default).
    #[arg(long)]
    pub lookback_days: Option<u32>,

    /// Seed universe usage: off, bootstrap or always.
    #[arg(long)]
    pub seed_mode: Option<SeedMode>,

    /// Entity resolution: off, hybrid or llm.
    #[arg(long)]
    pub resolution: Option<ResolutionMode>,

    /// Run query search even when feeds and pages found enough sources.
    #[arg(long)]
    pub force_search: bool,

    /// Skip allow-list follow-up searches.
    #[arg(long)]
    pub no_followup: bool,

    /// Do not write to the database.
    #[arg(long)]
    pub dry_run: bool,

    /// Database path (overrides [storage].database_path).
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Report output path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Benchmark name list, oldest first.
    #[arg(long)]
    pub benchmark: Option<PathBuf>,

    /// Seed universe name list.
    #[arg(long)]
    pub seeds: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "neolabs=info",
        1 => "neolabs=debug",
        _ => "neolabs=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest(args) => cmd_ingest(args, false).await,
        Command::Compare(args) => cmd_ingest(args, true).await,
        Command::Refresh { db, limit } => cmd_refresh(db, limit).await,
        Command::List { db } => cmd_list(db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Config-derived settings with command-line overrides applied.
fn ingest_settings(
    config: &AppConfig,
    args: &IngestArgs,
    force_dry_run: bool,
    step_summary: Option<PathBuf>,
) -> IngestSettings {
    let mut settings = IngestSettings::from(config);
    if let Some(profile) = args.profile {
        settings.profile = profile;
    }
    if let Some(days) = args.lookback_days {
        settings.lookback_override = days;
    }
    if let Some(mode) = args.seed_mode {
        settings.seed_mode = mode;
    }
    if let Some(mode) = args.resolution {
        settings.entity_resolution = mode;
    }
    settings.force_search |= args.force_search;
    if args.no_followup {
        settings.allowlist_followup = false;
    }
    settings.dry_run = force_dry_run || args.dry_run;
    if let Some(db) = &args.db {
        settings.database_path = Some(db.clone());
    }
    if let Some(report) = &args.report {
        settings.report_path = report.clone();
    }
    settings.step_summary_path = step_summary;
    settings
}

fn step_summary_from_env() -> Option<PathBuf> {
    std::env::var_os(STEP_SUMMARY_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Provider keys from the environment variables named in config.
fn provider_keys_from_env(config: &AppConfig) -> ProviderKeys {
    ProviderKeys::resolve(config, |name| std::env::var(name).ok())
}

/// Benchmark list (missing file means an empty benchmark) and, when the
/// run uses it, the seed universe (missing file is an error).
fn name_lists(config: &AppConfig, args: &IngestArgs, plan: RunPlan) -> Result<NameLists> {
    let benchmark_path = args
        .benchmark
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.benchmark.known_list));
    let benchmark = if benchmark_path.exists() {
        load_name_list(&benchmark_path)?
    } else {
        warn!(path = %benchmark_path.display(), "benchmark list not found; comparing against nothing");
        Vec::new()
    };

    let seeds = if plan.seed_universe {
        let seeds_path = args
            .seeds
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.benchmark.seed_universe));
        load_name_list(&seeds_path)?
    } else {
        Vec::new()
    };

    Ok(NameLists { benchmark, seeds })
}

fn database_path(config: &AppConfig, db: Option<PathBuf>) -> Result<PathBuf> {
    db.or_else(|| config.storage.database_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| eyre!("a database path is required; set [storage].database_path or pass --db"))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(args: IngestArgs, force_dry_run: bool) -> Result<()> {
    let config = load_config()?;
    let settings = ingest_settings(&config, &args, force_dry_run, step_summary_from_env());

    // Fail on a missing database before any network work.
    let storage = if settings.dry_run {
        None
    } else {
        Some(Storage::open(settings.require_database_path()?).await?)
    };

    let plan = RunPlan::for_settings(&settings);
    let lists = name_lists(&config, &args, plan)?;
    let providers = Providers::from_config(&config, &settings, &provider_keys_from_env(&config))?;

    info!(
        profile = settings.profile.as_str(),
        lookback_days = settings.lookback_days(),
        dry_run = settings.dry_run,
        "running ingest"
    );

    let reporter = CliProgress::new();
    let repo = storage.as_ref().map(|s| s as &dyn Repository);
    let outcome = run_ingest(&settings, &providers, repo, &lists, &reporter).await;
    reporter.finish();
    let outcome = outcome?;

    print_ingest(&outcome, &settings.report_path);
    Ok(())
}

fn print_ingest(outcome: &IngestOutcome, report_path: &Path) {
    let report = &outcome.report;
    println!();
    println!("  Ingest finished ({}).", report.profile);
    println!(
        "  Candidates: {} (unique {})",
        report.candidates.total, report.candidates.unique
    );
    println!(
        "  Benchmark:  {}/{} matched ({:.0}%, weighted {:.0}%)",
        report.benchmark.matched_count,
        report.benchmark.known_count,
        report.benchmark.match_rate * 100.0,
        report.benchmark.weighted_match_rate * 100.0
    );
    if let Some(summary) = &outcome.summary {
        println!(
            "  Companies:  {} created, {} updated, {} failed",
            summary.companies_created, summary.companies_updated, summary.failures
        );
        println!(
            "  Sources:    {} stored, {} links",
            summary.sources_upserted, summary.company_sources_linked
        );
    } else {
        println!("  Dry run:    nothing written to the database");
    }
    println!("  Report:     {}", report_path.display());
    println!("  Time:       {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
}

async fn cmd_refresh(db: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let path = database_path(&config, db)?;
    let keys = provider_keys_from_env(&config);
    let client = ParallelClient::from_config(&config.research, keys.research.as_deref())?.ok_or_else(|| {
        eyre!(
            "research provider key missing: set {} to run refresh",
            config.research.api_key_env
        )
    })?;
    let storage = Storage::open(&path).await?;

    let settings = IngestSettings::from(&config);
    let limit = limit.or(settings.known_max);
    info!(db = %path.display(), ?limit, "refreshing companies");

    let reporter = CliProgress::new();
    let summary = run_refresh(&storage, &client, limit, &reporter).await;
    reporter.finish();
    let summary = summary?;

    println!();
    println!("  Refresh finished.");
    println!("  Requested: {}", summary.requested);
    println!("  Updated:   {}", summary.updated);
    println!("  Missing:   {}", summary.missing);
    println!("  Failed:    {}", summary.failed);
    println!();
    Ok(())
}

async fn cmd_list(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let path = database_path(&config, db)?;
    if !path.exists() {
        return Err(eyre!("no database at '{}'", path.display()));
    }
    let storage = Storage::open_readonly(&path).await?;
    let companies = storage.list_companies().await?;

    if companies.is_empty() {
        println!("No companies stored.");
        return Ok(());
    }

    println!("{:<32} {:<28} {:<9} {}", "NAME", "DOMAIN", "STATUS", "VERIFIED");
    for company in &companies {
        println!(
            "{:<32} {:<28} {:<9} {}",
            company.name,
            company.canonical_domain.as_deref().unwrap_or("-"),
            company.status.as_str(),
            company
                .last_verified_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "never".into())
        );
    }
    println!();
    println!("{} companies", companies.len());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_parsed(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Resolving [{current}/{total}] {url}"));
    }

    fn done(&self, _outcome: &IngestOutcome) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("neolabs").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn ingest_flags_override_config() {
        let cli = parse(&[
            "ingest",
            "--profile",
            "benchmark",
            "--lookback-days",
            "30",
            "--seed-mode",
            "always",
            "--resolution",
            "hybrid",
            "--force-search",
            "--no-followup",
            "--db",
            "data/neolabs.db",
            "--report",
            "out/report.json",
        ]);
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };

        let settings = ingest_settings(&AppConfig::default(), &args, false, None);
        assert_eq!(settings.profile, IngestProfile::Benchmark);
        assert_eq!(settings.lookback_days(), 30);
        assert_eq!(settings.seed_mode, SeedMode::Always);
        assert_eq!(settings.entity_resolution, ResolutionMode::Hybrid);
        assert!(settings.force_search);
        assert!(!settings.allowlist_followup);
        assert!(!settings.dry_run);
        assert_eq!(settings.database_path.as_deref(), Some(Path::new("data/neolabs.db")));
        assert_eq!(settings.report_path, PathBuf::from("out/report.json"));
    }

    #[test]
    fn compare_is_always_dry() {
        let cli = parse(&["compare", "--profile", "custom"]);
        let Command::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        let settings = ingest_settings(&AppConfig::default(), &args, true, None);
        assert!(settings.dry_run);
        assert_eq!(settings.lookback_days(), 14);
        assert!(settings.require_database_path().is_err());
    }

    #[test]
    fn rejects_unknown_modes() {
        let err = Cli::try_parse_from(["neolabs", "ingest", "--seed-mode", "sometimes"]);
        assert!(err.is_err());
    }

    #[test]
    fn global_flags_parse_anywhere() {
        let cli = parse(&["list", "-vv", "--log-format", "json"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn missing_seed_file_is_an_error_only_when_used() {
        let args = IngestArgs {
            benchmark: Some(PathBuf::from("/nonexistent/known.txt")),
            seeds: Some(PathBuf::from("/nonexistent/seeds.txt")),
            ..IngestArgs::default()
        };
        let config = AppConfig::default();
        let plan = RunPlan {
            known_updates: true,
            new_discovery: true,
            seed_universe: false,
        };
        let lists = name_lists(&config, &args, plan).unwrap();
        assert!(lists.benchmark.is_empty());

        let plan = RunPlan {
            seed_universe: true,
            ..plan
        };
        assert!(name_lists(&config, &args, plan).is_err());
    }
}

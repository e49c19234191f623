//! Run report: benchmark comparison, run settings and provenance tallies.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use neolabs_shared::{Candidate, IngestSettings, NeoLabsError, Result, SearchSettings, Source};

use crate::benchmark::{BenchmarkComparison, normalize_for_comparison};

/// Extras listed in the report.
pub const EXTRAS_SAMPLE_SIZE: usize = 20;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateCounts {
    pub total: usize,
    pub unique: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkSection {
    pub known_count: usize,
    pub matched_count: usize,
    pub match_rate: f64,
    pub weighted_match_rate: f64,
    pub matched_weight: u64,
    pub total_weight: u64,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
}

/// Counts keyed by origin or pipeline name.
pub type Tally = BTreeMap<String, usize>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Provenance {
    pub sources_by_origin: Tally,
    pub sources_by_pipeline: Tally,
    pub matched_by_origin: Tally,
    pub matched_by_pipeline: Tally,
}

/// The JSON report artifact.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub generated_at: DateTime<Utc>,
    pub profile: String,
    pub lookback_days: u32,
    pub search: SearchSettings,
    pub seed_mode: String,
    pub entity_resolution_mode: String,
    pub candidates: CandidateCounts,
    pub benchmark: BenchmarkSection,
    pub provenance: Provenance,
    pub extras_sample: Vec<String>,
}

impl IngestReport {
    pub fn build(
        settings: &IngestSettings,
        comparison: &BenchmarkComparison,
        candidates: &[Candidate],
        sources: &[Source],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut extras_sample = comparison.extras.clone();
        extras_sample.sort();
        extras_sample.truncate(EXTRAS_SAMPLE_SIZE);

        Self {
            generated_at,
            profile: settings.profile.as_str().to_string(),
            lookback_days: settings.lookback_days(),
            search: settings.search(),
            seed_mode: settings.seed_mode.as_str().to_string(),
            entity_resolution_mode: settings.entity_resolution.as_str().to_string(),
            candidates: CandidateCounts {
                total: comparison.candidate_count,
                unique: comparison.unique_candidate_count,
            },
            benchmark: BenchmarkSection {
                known_count: comparison.known_count,
                matched_count: comparison.matched.len(),
                match_rate: comparison.match_rate,
                weighted_match_rate: comparison.weighted_match_rate,
                matched_weight: comparison.matched_weight,
                total_weight: comparison.total_weight,
                matched: comparison.matched.clone(),
                missing: comparison.missing.clone(),
            },
            provenance: provenance(sources, candidates, &comparison.matched),
            extras_sample,
        }
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| NeoLabsError::io(parent, e))?;
        }
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| NeoLabsError::parse(format!("failed to encode report: {e}")))?;
        json.push('\n');
        std::fs::write(path, json).map_err(|e| NeoLabsError::io(path, e))?;
        info!(path = %path.display(), "report written");
        Ok(())
    }

    /// Markdown summary for a CI step-summary file.
    pub fn summary_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Ingestion Report");
        let _ = writeln!(out);
        let _ = writeln!(out, "Profile: **{}**", self.profile);
        let _ = writeln!(out, "Lookback: **{} days**", self.lookback_days);
        let _ = writeln!(
            out,
            "Candidates: **{}** (unique {})",
            self.candidates.total, self.candidates.unique
        );
        let _ = writeln!(
            out,
            "Benchmark match: **{}%** | weighted **{}%**",
            percent(self.benchmark.match_rate),
            percent(self.benchmark.weighted_match_rate)
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "**Matched (benchmark)**: {}", name_list(&self.benchmark.matched));
        let _ = writeln!(out, "**Missing (benchmark)**: {}", name_list(&self.benchmark.missing));
        let _ = writeln!(out);
        let _ = writeln!(out, "### Provenance (Sources)");
        for (origin, count) in &self.provenance.sources_by_origin {
            let _ = writeln!(out, "- {origin}: {count}");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "### Provenance (Matched)");
        for (origin, count) in &self.provenance.matched_by_origin {
            let _ = writeln!(out, "- {origin}: {count}");
        }
        out
    }

    /// Append [`Self::summary_markdown`] to `path`.
    pub fn append_step_summary(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| NeoLabsError::io(path, e))?;
        file.write_all(self.summary_markdown().as_bytes())
            .map_err(|e| NeoLabsError::io(path, e))
    }
}

fn percent(rate: f64) -> i64 {
    (rate * 100.0).round() as i64
}

fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Source tallies plus, for candidates matching a benchmark name, the
/// distinct origins and pipelines behind each one.
pub fn provenance(sources: &[Source], candidates: &[Candidate], matched: &[String]) -> Provenance {
    let mut out = Provenance::default();
    for source in sources {
        *out.sources_by_origin.entry(origin_label(source)).or_default() += 1;
        *out.sources_by_pipeline.entry(pipeline_label(source)).or_default() += 1;
    }

    let matched: HashSet<String> = matched.iter().map(|n| normalize_for_comparison(n)).collect();
    let compact: HashSet<String> = matched.iter().map(|n| n.replace(' ', "")).collect();

    for candidate in candidates {
        let form = normalize_for_comparison(&candidate.name);
        if form.is_empty() || !(matched.contains(&form) || compact.contains(&form.replace(' ', ""))) {
            continue;
        }
        let origins: BTreeSet<String> = candidate.sources.iter().map(origin_label).collect();
        let pipelines: BTreeSet<String> = candidate.sources.iter().map(pipeline_label).collect();
        for origin in origins {
            *out.matched_by_origin.entry(origin).or_default() += 1;
        }
        for pipeline in pipelines {
            *out.matched_by_pipeline.entry(pipeline).or_default() += 1;
        }
    }
    out
}

fn origin_label(source: &Source) -> String {
    source.origin.map_or(UNKNOWN, |o| o.as_str()).to_string()
}

fn pipeline_label(source: &Source) -> String {
    source.pipeline.map_or(UNKNOWN, |p| p.as_str()).to_string()
}

//! Benchmark comparison: how many known-good names did a run find?
//!
//! Names are compared after stripping corporate suffixes, and the known list
//! is weighted by recency: the entry at 1-based position `i` (oldest first)
//! weighs `i`.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use neolabs_shared::{NeoLabsError, Result, normalize_name, parse_name_list};

/// Corporate-entity words ignored when comparing names.
const COMPARISON_STOP_WORDS: &[&str] = &[
    "lab",
    "labs",
    "laboratory",
    "laboratories",
    "inc",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "company",
    "co",
    "holdings",
    "group",
];

/// Result of comparing a run's candidate names against the known list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkComparison {
    pub candidate_count: usize,
    pub unique_candidate_count: usize,
    pub known_count: usize,
    /// Known names found, in known-list order.
    pub matched: Vec<String>,
    /// Known names not found, in known-list order.
    pub missing: Vec<String>,
    /// Candidate names not on the known list, in candidate order.
    pub extras: Vec<String>,
    pub match_rate: f64,
    pub weighted_match_rate: f64,
    pub matched_weight: u64,
    pub total_weight: u64,
}

/// Comparison form: normalized, `-` split, `&` spelled out, suffixes dropped.
pub fn normalize_for_comparison(name: &str) -> String {
    let normalized = normalize_name(name);
    if normalized.is_empty() {
        return String::new();
    }
    normalized
        .replace('-', " ")
        .replace('&', " and ")
        .split_whitespace()
        .filter(|token| !COMPARISON_STOP_WORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapsed(normalized: &str) -> String {
    normalized.split_whitespace().collect()
}

struct Entry<'a> {
    name: &'a str,
    normalized: String,
}

/// First occurrence of each comparison form, in input order.
fn unique_entries(names: &[String]) -> Vec<Entry<'_>> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter_map(|name| {
            let normalized = normalize_for_comparison(name);
            (!normalized.is_empty() && seen.insert(normalized.clone())).then_some(Entry {
                name: name.as_str(),
                normalized,
            })
        })
        .collect()
}

/// Compare candidate names with the known list (oldest entry first).
///
/// Two names match when their comparison forms are equal, or equal once all
/// whitespace is removed.
pub fn compare(candidate_names: &[String], known_names: &[String]) -> BenchmarkComparison {
    let candidates = unique_entries(candidate_names);
    let candidate_forms: HashSet<&str> = candidates.iter().map(|e| e.normalized.as_str()).collect();
    let candidate_collapsed: HashSet<String> =
        candidates.iter().map(|e| collapsed(&e.normalized)).collect();

    let known = unique_entries(known_names);
    let known_forms: HashSet<&str> = known.iter().map(|e| e.normalized.as_str()).collect();
    let known_collapsed: HashSet<String> = known.iter().map(|e| collapsed(&e.normalized)).collect();

    let total_weight: u64 = (1..=known.len() as u64).sum();
    let mut matched_weight = 0;
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    for (index, entry) in known.iter().enumerate() {
        let hit = candidate_forms.contains(entry.normalized.as_str())
            || candidate_collapsed.contains(&collapsed(&entry.normalized));
        if hit {
            matched.push(entry.name.to_string());
            matched_weight += index as u64 + 1;
        } else {
            missing.push(entry.name.to_string());
        }
    }

    let extras = candidates
        .iter()
        .filter(|e| {
            !known_forms.contains(e.normalized.as_str())
                && !known_collapsed.contains(&collapsed(&e.normalized))
        })
        .map(|e| e.name.to_string())
        .collect();

    let match_rate = if known.is_empty() {
        0.0
    } else {
        matched.len() as f64 / known.len() as f64
    };
    let weighted_match_rate = if total_weight == 0 {
        0.0
    } else {
        matched_weight as f64 / total_weight as f64
    };

    BenchmarkComparison {
        candidate_count: candidate_names.len(),
        unique_candidate_count: candidates.len(),
        known_count: known.len(),
        matched,
        missing,
        extras,
        match_rate,
        weighted_match_rate,
        matched_weight,
        total_weight,
    }
}

/// Read a one-name-per-line list (benchmark or seed universe).
pub fn load_name_list(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| NeoLabsError::io(path, e))?;
    Ok(parse_name_list(&contents))
}

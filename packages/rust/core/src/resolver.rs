//! Entity resolution: which company is a document about?
//!
//! Heuristics come first, in priority order: structured-metadata names, the
//! name pattern-matched out of the title, caller-supplied fallbacks, and
//! last of all a name read off the URL's domain. An optional LLM fallback
//! arbitrates according to [`ResolutionMode`].

use std::collections::HashSet;
use std::sync::{Arc, Once};

use tracing::{debug, warn};

use neolabs_shared::{
    ResolutionMode, collapse_whitespace, company_name_from_title, hostname, is_likely_company_name,
    normalize_name,
};

use crate::llm::{LlmFallback, NameQuery};

const CLEAN_PREFIXES: &[&str] = &[
    "exclusive:",
    "exclusive",
    "ai startup",
    "startup",
    "new startup",
    "ai lab",
    "research lab",
];

const SUSPICIOUS_MARKERS: &[&str] = &[
    "ai startup",
    "startup",
    "exclusive",
    "funding",
    "raises",
    "raised",
    "series",
    "seed",
];

const DOMAIN_SUFFIXES: &[&str] = &["labs", "lab", "ai", "research", "intelligence", "math"];

const DOMAIN_STOP_WORDS: &[&str] = &[
    "www", "home", "homepage", "index", "blog", "news", "app", "site", "official",
];

/// Evidence about one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverInput {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub meta_description: Option<String>,
    pub json_ld_names: Vec<String>,
    /// Extra heuristic names, tried after the title.
    pub fallback_names: Vec<String>,
}

/// Which path produced the resolved names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    /// Heuristics only, by mode or because they looked sound.
    Heuristic,
    /// The LLM named the company.
    Llm,
    /// The LLM was wanted but unavailable, failed, or answered unusably.
    HeuristicFallback,
}

impl ResolutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Llm => "llm",
            Self::HeuristicFallback => "heuristic_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub names: Vec<String>,
    pub path: ResolutionPath,
}

/// Strip one leading generic descriptor ("Exclusive:", "AI startup", ...).
pub fn clean_prefixes(value: &str) -> String {
    let trimmed = collapse_whitespace(value);
    let lowered = trimmed.to_ascii_lowercase();
    for prefix in CLEAN_PREFIXES {
        if lowered.starts_with(&format!("{prefix} ")) {
            return trimmed[prefix.len()..].trim().to_string();
        }
    }
    trimmed
}

/// A name worth a second opinion: implausible, or full of marketing words.
pub fn is_suspicious(name: &str) -> bool {
    let cleaned = clean_prefixes(name);
    if !is_likely_company_name(&cleaned) {
        return true;
    }
    let lowered = cleaned.to_lowercase();
    SUSPICIOUS_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Company name guessed from a URL's registrable label.
///
/// `periodiclabs.com` gives "Periodic Labs", `my-company.io` "My Company".
pub fn name_from_domain(url: &str) -> Option<String> {
    let host = hostname(url)?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    let mut label = labels[labels.len() - 2].to_string();
    if label.is_empty() {
        return None;
    }

    for suffix in DOMAIN_SUFFIXES {
        if label.ends_with(suffix) && label.len() > suffix.len() + 1 {
            label = format!("{} {suffix}", &label[..label.len() - suffix.len()]);
            break;
        }
    }

    let spaced: String = label
        .chars()
        .map(|c| if c == '-' || c == '_' || c.is_ascii_digit() { ' ' } else { c })
        .collect();
    let tokens: Vec<String> = spaced
        .split_whitespace()
        .filter(|token| !DOMAIN_STOP_WORDS.contains(token))
        .map(capitalize)
        .collect();
    (!tokens.is_empty()).then(|| tokens.join(" "))
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolves documents to company names.
pub struct EntityResolver {
    mode: ResolutionMode,
    llm: Option<Arc<dyn LlmFallback>>,
    missing_llm_warning: Once,
}

impl EntityResolver {
    /// `llm` is `None` when the provider key is missing.
    pub fn new(mode: ResolutionMode, llm: Option<Arc<dyn LlmFallback>>) -> Self {
        Self {
            mode,
            llm,
            missing_llm_warning: Once::new(),
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Metadata, title and fallback names: cleaned, deduplicated, in order.
    pub fn heuristic_names(input: &ResolverInput) -> Vec<String> {
        let title_name = input.title.as_deref().and_then(company_name_from_title);
        let mut seen = HashSet::new();
        input
            .json_ld_names
            .iter()
            .cloned()
            .chain(title_name)
            .chain(input.fallback_names.iter().cloned())
            .map(|name| clean_prefixes(&name))
            .filter(|name| !name.is_empty() && seen.insert(normalize_name(name)))
            .collect()
    }

    pub async fn resolve(&self, input: &ResolverInput) -> Resolution {
        let hints = Self::heuristic_names(input);

        let wants_llm = match self.mode {
            ResolutionMode::Off => false,
            ResolutionMode::Llm => true,
            ResolutionMode::Hybrid => hints.is_empty() || hints.iter().any(|h| is_suspicious(h)),
        };

        let path = if wants_llm {
            match self.ask_llm(input, &hints).await {
                Some(name) => {
                    return Resolution {
                        names: vec![name],
                        path: ResolutionPath::Llm,
                    };
                }
                None => ResolutionPath::HeuristicFallback,
            }
        } else {
            ResolutionPath::Heuristic
        };

        let names = if hints.is_empty() {
            name_from_domain(&input.url).into_iter().collect()
        } else {
            hints
        };
        Resolution { names, path }
    }

    async fn ask_llm(&self, input: &ResolverInput, hints: &[String]) -> Option<String> {
        let Some(llm) = self.llm.as_deref() else {
            self.missing_llm_warning
                .call_once(|| warn!("LLM key missing; entity resolution falls back to heuristics"));
            return None;
        };

        let query = NameQuery {
            url: input.url.clone(),
            title: input.title.clone(),
            snippet: input.snippet.clone(),
            meta_description: input.meta_description.clone(),
            json_ld_names: input.json_ld_names.clone(),
            candidate_hints: hints.to_vec(),
        }
        .truncated();

        match llm.company_name(&query).await {
            Ok(Some(raw)) => {
                let name = clean_prefixes(&raw);
                if !name.is_empty() && is_likely_company_name(&name) {
                    debug!(url = %input.url, %name, provider = llm.name(), "llm resolved company");
                    Some(name)
                } else {
                    debug!(url = %input.url, %raw, "llm answer rejected");
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(url = %input.url, error = %e, "entity resolution failed");
                None
            }
        }
    }
}

//! Core domain types: sources, candidates, known companies, funding rounds.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NeoLabsError;
use crate::normalize::normalize_name;

// ---------------------------------------------------------------------------
// Provenance tags
// ---------------------------------------------------------------------------

/// What a source says about the company it is linked to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Overview,
    Funding,
    People,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Funding => "funding",
            Self::People => "people",
        }
    }
}

/// How a source was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    Rss,
    Discovery,
    Search,
    SeedSearch,
    AllowlistFollowup,
}

impl SourceOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Discovery => "discovery",
            Self::Search => "search",
            Self::SeedSearch => "seed_search",
            Self::AllowlistFollowup => "allowlist_followup",
        }
    }
}

/// Which acquisition pipeline produced a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePipeline {
    KnownUpdates,
    NewDiscovery,
    SeedBootstrap,
}

impl SourcePipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KnownUpdates => "known_updates",
            Self::NewDiscovery => "new_discovery",
            Self::SeedBootstrap => "seed_bootstrap",
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A normalized reference to a fetched document or search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Canonical URL (see [`crate::url::normalize_url`]).
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<SourcePipeline>,
    /// Search query that surfaced this source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Source {
    /// A bare overview source with no metadata.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            publisher: None,
            published_at: None,
            snippet: None,
            kind: SourceKind::Overview,
            origin: None,
            pipeline: None,
            query: None,
        }
    }

    /// Tag with acquisition provenance.
    pub fn tagged(mut self, origin: SourceOrigin, pipeline: SourcePipeline) -> Self {
        self.origin = Some(origin);
        self.pipeline = Some(pipeline);
        self
    }

    /// First-wins field fill from another record with the same canonical URL.
    ///
    /// | field | precedence |
    /// |---|---|
    /// | url, kind | self |
    /// | title, publisher, published_at, snippet, origin, pipeline, query | first non-null |
    pub fn merge(&mut self, other: &Source) {
        fill(&mut self.title, &other.title);
        fill(&mut self.publisher, &other.publisher);
        fill(&mut self.published_at, &other.published_at);
        fill(&mut self.snippet, &other.snippet);
        fill(&mut self.origin, &other.origin);
        fill(&mut self.pipeline, &other.pipeline);
        fill(&mut self.query, &other.query);
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(other);
    }
}

// ---------------------------------------------------------------------------
// People & funding
// ---------------------------------------------------------------------------

/// A person associated with a company (founder, executive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub is_founder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_source_url: Option<String>,
}

/// Round type used for synthetic point-in-time valuation rounds.
pub const VALUATION_ROUND_TYPE: &str = "valuation";

/// A funding event. Monetary values are whole USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingRound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_usd: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announced_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub investors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl FundingRound {
    /// A round with no type, amount, or valuation carries no information.
    pub fn is_empty(&self) -> bool {
        self.round_type.is_none() && self.amount_usd.is_none() && self.valuation_usd.is_none()
    }

    /// Identity rule: same type and same day when both are dated,
    /// otherwise same type, amount, and valuation.
    pub fn same_identity(&self, other: &FundingRound) -> bool {
        if self.round_type != other.round_type {
            return false;
        }
        match (self.announced_at, other.announced_at) {
            (Some(a), Some(b)) => a == b,
            _ => self.amount_usd == other.amount_usd && self.valuation_usd == other.valuation_usd,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A prospective company inferred from one or more sources during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Display name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_domain: Option<String>,
    /// Normalized name forms; always contains the normalized display name.
    pub aliases: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Supporting sources, unique by canonical URL.
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people: Vec<Person>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funding_rounds: Vec<FundingRound>,
}

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut aliases = BTreeSet::new();
        let normalized = normalize_name(&name);
        if !normalized.is_empty() {
            aliases.insert(normalized);
        }
        Self {
            name,
            website_url: None,
            canonical_domain: None,
            aliases,
            last_verified_at: None,
            sources: Vec::new(),
            people: Vec::new(),
            funding_rounds: Vec::new(),
        }
    }

    /// Merge key: the normalized name, or the lower-cased display name when
    /// normalization strips everything.
    pub fn merge_key(&self) -> String {
        let normalized = normalize_name(&self.name);
        if normalized.is_empty() {
            self.name.to_lowercase()
        } else {
            normalized
        }
    }

    /// Add a source, folding it into an existing entry with the same URL.
    pub fn add_source(&mut self, source: Source) {
        match self.sources.iter_mut().find(|s| s.url == source.url) {
            Some(existing) => existing.merge(&source),
            None => self.sources.push(source),
        }
    }

    pub fn add_alias(&mut self, alias: &str) {
        let normalized = normalize_name(alias);
        if !normalized.is_empty() {
            self.aliases.insert(normalized);
        }
    }
}

/// Candidates plus every source collected on the way, for provenance tallies.
#[derive(Debug, Clone, Default)]
pub struct CandidateCollection {
    pub candidates: Vec<Candidate>,
    pub sources: Vec<Source>,
}

impl CandidateCollection {
    pub fn extend(&mut self, other: CandidateCollection) {
        self.candidates.extend(other.candidates);
        self.sources.extend(other.sources);
    }
}

// ---------------------------------------------------------------------------
// Known companies
// ---------------------------------------------------------------------------

/// Lifecycle status of a stored company.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    #[default]
    Active,
    Stealth,
    Inactive,
    Unknown,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stealth => "stealth",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for CompanyStatus {
    type Err = NeoLabsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "stealth" => Ok(Self::Stealth),
            "inactive" => Ok(Self::Inactive),
            "unknown" => Ok(Self::Unknown),
            other => Err(NeoLabsError::validation(format!(
                "unknown company status '{other}'"
            ))),
        }
    }
}

/// A persisted company record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownCompany {
    pub id: String,
    pub name: String,
    pub canonical_domain: Option<String>,
    pub website_url: Option<String>,
    pub aliases: Vec<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub status: CompanyStatus,
    pub employee_count: Option<u32>,
    pub known_revenue: Option<String>,
    pub focus: Option<String>,
    pub hq_location: Option<String>,
    pub founded_year: Option<i32>,
    pub description: Option<String>,
}

/// Field changes produced by the refresh reconciler. `None` means "leave as is".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshUpdate {
    pub website_url: Option<String>,
    pub canonical_domain: Option<String>,
    pub employee_count: Option<u32>,
    pub known_revenue: Option<String>,
    pub status: Option<CompanyStatus>,
    pub description: Option<String>,
    pub focus: Option<String>,
    pub hq_location: Option<String>,
    pub founded_year: Option<i32>,
    pub last_verified_at: DateTime<Utc>,
}

impl RefreshUpdate {
    /// An update that only stamps the verification time.
    pub fn stamped(at: DateTime<Utc>) -> Self {
        Self {
            website_url: None,
            canonical_domain: None,
            employee_count: None,
            known_revenue: None,
            status: None,
            description: None,
            focus: None,
            hq_location: None,
            founded_year: None,
            last_verified_at: at,
        }
    }
}

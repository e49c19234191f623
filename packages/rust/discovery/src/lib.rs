//! Source collection for the candidate pipeline.
//!
//! Before any company is resolved, the collector gathers source documents
//! from RSS/Atom feeds, VC discovery pages and a search provider, tags each
//! with its acquisition origin and pipeline, and cuts the result down to a
//! ranked parse budget.

mod collector;
mod feeds;
mod pages;
mod queries;
mod rank;
mod search;

use chrono::{DateTime, Duration, Utc};

use neolabs_shared::normalize_url;

pub use collector::{Collector, DiscoveredSources};
pub use feeds::{FeedItem, feed_sources, parse_feed};
pub use pages::{page_link_sources, page_source};
pub use queries::{followup_queries, known_company_queries, mentions_any, seed_queries};
pub use rank::{dedupe_sources, rank_sources};
pub use search::{SearchProvider, SearchRequest, SearchResult, TavilyClient};

/// Minimum relevance for a collected source to be kept.
pub const MIN_SOURCE_SCORE: i32 = 2;

/// Canonical URL, or the raw string when it does not parse.
pub fn canonical_url(raw: &str) -> String {
    normalize_url(raw).unwrap_or_else(|| raw.to_string())
}

/// Inside the lookback window; undated items count as recent.
pub fn is_recent(published_at: Option<DateTime<Utc>>, lookback_days: u32, now: DateTime<Utc>) -> bool {
    let cutoff = now - Duration::days(i64::from(lookback_days));
    published_at.is_none_or(|at| at >= cutoff)
}

//! Page adapters: per-site extraction of company evidence.
//!
//! Listing pages (VC portfolios, startup directories) yield many companies
//! each; everything else is treated as an article about one subject and
//! yields evidence for the entity resolver.

mod article;
mod directory;
mod portfolio;

use neolabs_shared::{DomainPolicy, score};
use scraper::{ElementRef, Html};
use url::Url;

pub use article::ArticleAdapter;
pub use directory::DirectoryAdapter;
pub use portfolio::PortfolioAdapter;

use crate::extract::{anchor_label, card_context};

/// Minimum relevance for a company listed on a portfolio or directory page.
///
/// Lower than the per-article threshold: a listing card carries little text.
pub const MIN_LISTING_SCORE: i32 = 1;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A company found on a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub name: String,
    pub website_url: Option<String>,
    pub score: i32,
}

/// Evidence about the single company an article is about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleEvidence {
    pub meta_description: Option<String>,
    pub json_ld_names: Vec<String>,
    pub website_url: Option<String>,
}

/// What an adapter pulled out of a page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageExtraction {
    Listings(Vec<Listing>),
    Article(ArticleEvidence),
}

/// Site-specific extraction.
///
/// Adapters are tried in priority order; [`ArticleAdapter`] is the
/// always-last fallback.
pub trait PageAdapter: Send + Sync {
    /// Whether this adapter handles pages at `url`.
    fn detect(&self, url: &Url) -> bool;

    /// Extract evidence from a parsed page.
    fn extract(&self, doc: &Html, url: &Url) -> PageExtraction;

    /// Adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered adapters in priority order.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn PageAdapter>>,
    fallback: ArticleAdapter,
}

impl AdapterRegistry {
    /// Built-in adapters: portfolio, then directory, then the article fallback.
    pub fn new(policy: DomainPolicy, directory_domains: Vec<String>) -> Self {
        Self {
            adapters: vec![
                Box::new(PortfolioAdapter::new(policy.clone())),
                Box::new(DirectoryAdapter::new(directory_domains)),
            ],
            fallback: ArticleAdapter::new(policy),
        }
    }

    /// Best adapter for `url`. Always returns one.
    pub fn detect(&self, url: &Url) -> &dyn PageAdapter {
        self.adapters
            .iter()
            .find(|adapter| adapter.detect(url))
            .map(|adapter| adapter.as_ref())
            .unwrap_or(&self.fallback)
    }
}

// ---------------------------------------------------------------------------
// Shared listing helpers
// ---------------------------------------------------------------------------

/// Label and relevance of one listing link, or `None` if it is chrome.
pub(crate) fn listing_candidate(el: &ElementRef<'_>, stop_texts: &[&str]) -> Option<(String, i32)> {
    let name = anchor_label(el);
    if name.is_empty() || stop_texts.contains(&name.to_lowercase().as_str()) {
        return None;
    }
    if !neolabs_shared::is_likely_company_name(&name) {
        return None;
    }
    let context = card_context(el);
    let relevance = score(Some(&name), Some(&context));
    Some((name, relevance.score))
}

/// Sort by score descending (stable) and cap.
pub(crate) fn rank_listings(mut listings: Vec<Listing>, cap: usize) -> Vec<Listing> {
    listings.sort_by(|a, b| b.score.cmp(&a.score));
    listings.truncate(cap);
    listings
}

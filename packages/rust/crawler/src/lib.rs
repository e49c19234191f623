//! HTTP fetching, HTML evidence extraction, and page adapters.
//!
//! This crate provides:
//! - [`fetcher`]: time-bounded, SSRF-guarded fetching with bounded concurrency
//! - [`extract`]: titles, meta descriptions, JSON-LD organisations, links
//! - [`adapters`]: portfolio, directory and article extraction
//! - [`AdapterRegistry`]: picks the adapter for a page URL

pub mod adapters;
pub mod extract;
pub mod fetcher;

pub use adapters::{
    AdapterRegistry, ArticleAdapter, ArticleEvidence, DirectoryAdapter, Listing,
    MIN_LISTING_SCORE, PageAdapter, PageExtraction, PortfolioAdapter,
};
pub use extract::{Link, external_website, json_ld_organizations, links, meta_description, page_title};
pub use fetcher::{Fetcher, USER_AGENT, http_client};

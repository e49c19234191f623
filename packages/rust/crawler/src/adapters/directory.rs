//! Startup directory sites (seedtable, topstartups, ...).
//!
//! Company entries are links into the directory's own profile pages, so
//! links are selected by path shape rather than by host.

use std::collections::HashSet;

use neolabs_shared::{host_matches, hostname, normalize_name};
use scraper::Html;
use url::Url;

use super::{Listing, MIN_LISTING_SCORE, PageAdapter, PageExtraction, listing_candidate, rank_listings};
use crate::extract::anchors;

const MAX_DIRECTORY_COMPANIES: usize = 80;

const PATH_HINTS: &[&str] = &[
    "/startup",
    "/startups",
    "/company",
    "/companies",
    "/organization",
    "/org",
    "/profile",
];

const STOP_TEXTS: &[&str] = &[
    "startups",
    "startup",
    "companies",
    "company",
    "directory",
    "view",
    "see more",
    "learn more",
    "read more",
];

/// Adapter for configured directory domains.
pub struct DirectoryAdapter {
    domains: Vec<String>,
}

impl DirectoryAdapter {
    pub fn new(domains: Vec<String>) -> Self {
        Self { domains }
    }
}

impl PageAdapter for DirectoryAdapter {
    fn detect(&self, url: &Url) -> bool {
        hostname(url.as_str()).is_some_and(|h| host_matches(&h, &self.domains))
    }

    fn extract(&self, doc: &Html, url: &Url) -> PageExtraction {
        let Some(page_host) = hostname(url.as_str()) else {
            return PageExtraction::Listings(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut listings = Vec::new();
        for (el, link) in anchors(doc, url) {
            let path = link.path().to_lowercase();
            if !PATH_HINTS.iter().any(|hint| path.contains(hint)) {
                continue;
            }
            let Some((name, score)) = listing_candidate(&el, STOP_TEXTS) else {
                continue;
            };
            let normalized = normalize_name(&name);
            if normalized.is_empty() || seen.contains(&normalized) || score < MIN_LISTING_SCORE {
                continue;
            }
            seen.insert(normalized);

            let external = hostname(link.as_str()).is_some_and(|h| h != page_host);
            listings.push(Listing {
                name,
                website_url: external.then(|| link.to_string()),
                score,
            });
        }

        PageExtraction::Listings(rank_listings(listings, MAX_DIRECTORY_COMPANIES))
    }

    fn name(&self) -> &str {
        "directory"
    }
}

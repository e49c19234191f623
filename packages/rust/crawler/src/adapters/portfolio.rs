//! VC portfolio pages (a16z).
//!
//! Every outbound link to a site outside the allow/deny lists is a potential
//! portfolio company; the enclosing card text supplies the relevance signal.
//! Company sites are recorded but never fetched.

use neolabs_shared::{DomainPolicy, hostname};
use scraper::Html;
use url::Url;

use super::{Listing, MIN_LISTING_SCORE, PageAdapter, PageExtraction, listing_candidate, rank_listings};
use crate::extract::anchors;

const MAX_PORTFOLIO_COMPANIES: usize = 60;

const STOP_TEXTS: &[&str] = &[
    "learn more",
    "read more",
    "portfolio",
    "careers",
    "about",
    "contact",
    "privacy",
    "terms",
];

/// Adapter for a16z portfolio listings.
pub struct PortfolioAdapter {
    policy: DomainPolicy,
}

impl PortfolioAdapter {
    pub fn new(policy: DomainPolicy) -> Self {
        Self { policy }
    }
}

impl PageAdapter for PortfolioAdapter {
    fn detect(&self, url: &Url) -> bool {
        hostname(url.as_str()).is_some_and(|h| h.ends_with("a16z.com"))
            && url.path().contains("/portfolio")
    }

    fn extract(&self, doc: &Html, url: &Url) -> PageExtraction {
        let Some(page_host) = hostname(url.as_str()) else {
            return PageExtraction::Listings(Vec::new());
        };

        let mut listings = Vec::new();
        for (el, link) in anchors(doc, url) {
            let Some(host) = hostname(link.as_str()) else {
                continue;
            };
            if host == page_host || !self.policy.is_unlisted_host(&host) {
                continue;
            }
            let Some((name, score)) = listing_candidate(&el, STOP_TEXTS) else {
                continue;
            };
            if score < MIN_LISTING_SCORE {
                continue;
            }
            listings.push(Listing {
                name,
                website_url: Some(link.to_string()),
                score,
            });
        }

        PageExtraction::Listings(rank_listings(listings, MAX_PORTFOLIO_COMPANIES))
    }

    fn name(&self) -> &str {
        "portfolio"
    }
}

//! Per-source candidate building.
//!
//! Each ranked source is fetched (when its host is allow-listed), routed to
//! a page adapter, and turned into zero or more candidates. Listing pages
//! yield one candidate per listed company; articles go through the
//! [`EntityResolver`]. Sources are processed concurrently, results come back
//! in ranked order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use scraper::Html;
use tracing::{debug, instrument, warn};
use url::Url;

use neolabs_crawler::{AdapterRegistry, ArticleEvidence, Fetcher, PageExtraction};
use neolabs_discovery::canonical_url;
use neolabs_shared::{
    Candidate, IngestSettings, Source, company_name_from_title, is_likely_company_name,
    normalize_name, score,
};

use crate::pipeline::ProgressReporter;
use crate::resolver::{EntityResolver, ResolverInput};

/// Minimum relevance for a candidate resolved from an article.
pub const MIN_CANDIDATE_SCORE: i32 = 2;

/// Turns sources into candidates.
pub struct CandidateBuilder<'a> {
    settings: &'a IngestSettings,
    fetcher: Fetcher,
    registry: AdapterRegistry,
    resolver: EntityResolver,
}

impl<'a> CandidateBuilder<'a> {
    pub fn new(settings: &'a IngestSettings, fetcher: Fetcher, resolver: EntityResolver) -> Self {
        Self {
            settings,
            fetcher,
            registry: AdapterRegistry::new(
                settings.domains.clone(),
                settings.directory_domains.clone(),
            ),
            resolver,
        }
    }

    /// Build candidates for every source, at most `concurrency` at a time.
    ///
    /// Output order follows `sources`.
    #[instrument(skip_all, fields(sources = sources.len(), concurrency = self.settings.concurrency))]
    pub async fn build_all(&self, sources: &[Source], progress: &dyn ProgressReporter) -> Vec<Candidate> {
        let total = sources.len();
        let done = &AtomicUsize::new(0);

        let per_source: Vec<Vec<Candidate>> = stream::iter(sources)
            .map(|source| async move {
                let candidates = self.build_from_source(source).await;
                let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.source_parsed(&source.url, current, total);
                candidates
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        per_source.into_iter().flatten().collect()
    }

    /// Candidates from one source. Never fails: fetch and parse problems
    /// degrade to title-only resolution.
    pub async fn build_from_source(&self, source: &Source) -> Vec<Candidate> {
        let mut source = source.clone();
        source.url = canonical_url(&source.url);

        let can_fetch = self.settings.domains.is_fetch_allowed(&source.url);
        let mut evidence = ArticleEvidence::default();

        if can_fetch {
            match self.fetcher.fetch_text(&source.url).await {
                Ok(html) => match self.extract(&source.url, &html) {
                    Some(PageExtraction::Listings(listings)) => {
                        debug!(url = %source.url, listings = listings.len(), "listing page");
                        return listings
                            .into_iter()
                            .filter(|listing| !normalize_name(&listing.name).is_empty())
                            .map(|listing| {
                                let mut candidate = Candidate::new(listing.name);
                                candidate.website_url = listing.website_url;
                                candidate.last_verified_at = source.published_at;
                                candidate.add_source(source.clone());
                                candidate
                            })
                            .collect();
                    }
                    Some(PageExtraction::Article(article)) => evidence = article,
                    None => {}
                },
                Err(e) => warn!(url = %source.url, error = %e, "fetch failed, using title only"),
            }
        }

        // Unfetchable pages fall back to the headline itself.
        let fallback_names = match source.title.as_deref() {
            Some(title) if !can_fetch && company_name_from_title(title).is_none() => {
                vec![title.to_string()]
            }
            _ => Vec::new(),
        };

        let input = ResolverInput {
            url: source.url.clone(),
            title: source.title.clone(),
            snippet: source.snippet.clone(),
            meta_description: evidence.meta_description.clone(),
            json_ld_names: evidence.json_ld_names,
            fallback_names,
        };
        let resolution = self.resolver.resolve(&input).await;
        debug!(
            url = %source.url,
            names = ?resolution.names,
            path = resolution.path.as_str(),
            "resolved"
        );

        let context = [source.snippet.as_deref(), evidence.meta_description.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for name in resolution.names {
            if !is_likely_company_name(&name) {
                continue;
            }
            let headline = source.title.as_deref().unwrap_or(&name);
            if score(Some(headline), Some(&context)).score < MIN_CANDIDATE_SCORE {
                continue;
            }
            let normalized = normalize_name(&name);
            if normalized.is_empty() || !seen.insert(normalized) {
                continue;
            }
            let mut candidate = Candidate::new(name);
            candidate.website_url = evidence.website_url.clone();
            candidate.last_verified_at = source.published_at;
            candidate.add_source(source.clone());
            candidates.push(candidate);
        }
        candidates
    }

    /// Parse and route one page. Kept synchronous: the parsed document
    /// must not live across an await point.
    fn extract(&self, url: &str, html: &str) -> Option<PageExtraction> {
        let parsed = Url::parse(url).ok()?;
        let doc = Html::parse_document(html);
        let adapter = self.registry.detect(&parsed);
        debug!(%url, adapter = adapter.name(), "extracting");
        Some(adapter.extract(&doc, &parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use neolabs_shared::{AppConfig, DomainPolicy, ResolutionMode, SourceOrigin, SourcePipeline};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::pipeline::SilentProgress;

    fn settings(directory: bool) -> IngestSettings {
        let mut settings = IngestSettings::from(&AppConfig::default());
        settings.domains = DomainPolicy::new(
            vec!["127.0.0.1".into(), "techcrunch.com".into()],
            vec!["linkedin.com".into()],
        );
        settings.directory_domains = if directory {
            vec!["127.0.0.1".into()]
        } else {
            Vec::new()
        };
        settings
    }

    fn builder(settings: &IngestSettings) -> CandidateBuilder<'_> {
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap().allow_localhost();
        CandidateBuilder::new(settings, fetcher, EntityResolver::new(ResolutionMode::Off, None))
    }

    fn source(url: &str, title: &str) -> Source {
        let mut source = Source::new(url).tagged(SourceOrigin::Rss, SourcePipeline::NewDiscovery);
        source.title = Some(title.into());
        source.published_at = Some(Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap());
        source
    }

    #[tokio::test]
    async fn article_uses_json_ld_and_website() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head>
                  <meta name="description" content="The research lab raised a seed round.">
                  <script type="application/ld+json">{"@type":"NewsArticle",
                    "publisher":{"@type":"Organization","name":"TechCrunch"},
                    "about":{"@type":"Organization","name":"Periodic Labs"}}</script>
                </head><body><a href="https://periodic.com">Periodic Labs website</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        let settings = settings(false);
        let candidates = builder(&settings)
            .build_from_source(&source(&format!("{}/story", server.uri()), "A new chapter"))
            .await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Periodic Labs");
        assert_eq!(candidates[0].website_url.as_deref(), Some("https://periodic.com/"));
        assert_eq!(candidates[0].sources.len(), 1);
        assert_eq!(
            candidates[0].last_verified_at,
            Some(Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let settings = settings(false);
        let candidates = builder(&settings)
            .build_from_source(&source(
                &format!("{}/story", server.uri()),
                "Reka raises $58M seed for its AI research lab",
            ))
            .await;
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Reka"]);
    }

    #[tokio::test]
    async fn unfetchable_source_uses_headline() {
        let settings = settings(false);
        let candidates = builder(&settings)
            .build_from_source(&source(
                "https://www.bloomberg.com/news/nexus?utm_source=x",
                "Nexus Labs emerges from stealth as AI research lab",
            ))
            .await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Nexus Labs");
        assert_eq!(candidates[0].sources[0].url, "https://bloomberg.com/news/nexus");
    }

    #[tokio::test]
    async fn low_relevance_is_dropped() {
        let settings = settings(false);
        let candidates = builder(&settings)
            .build_from_source(&source("https://bloomberg.com/x", "Acme raises prices as Google and Microsoft weigh in"))
            .await;
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn directory_pages_yield_listings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/startups"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body>
                  <div><a href="/company/nexus-labs">Nexus Labs</a> AI research lab, seed stage</div>
                  <div><a href="/company/orbit">Orbit</a> foundation model startup</div>
                  <a href="/about">About</a>
                </body></html>"#,
            ))
            .mount(&server)
            .await;

        let settings = settings(true);
        let candidates = builder(&settings)
            .build_from_source(&source(&format!("{}/startups", server.uri()), "Top AI startups"))
            .await;
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"Nexus Labs"));
        assert!(!names.contains(&"About"));
        assert!(candidates.iter().all(|c| c.sources.len() == 1));
    }

    #[tokio::test]
    async fn build_all_keeps_ranked_order() {
        let settings = settings(false);
        let sources = vec![
            source("https://bloomberg.com/a", "Nexus Labs emerges from stealth as AI research lab"),
            source("https://bloomberg.com/b", "Acme raises prices as Google and Microsoft weigh in"),
            source("https://bloomberg.com/c", "Orbit AI raises seed round for foundation model lab"),
        ];
        let candidates = builder(&settings).build_all(&sources, &SilentProgress).await;
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Nexus Labs", "Orbit AI"]);
    }
}

//! The Source Collector: feeds, discovery pages, query search, follow-ups,
//! and the targeted known-company and seed-universe searches.

use std::sync::{Arc, Once};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use neolabs_crawler::Fetcher;
use neolabs_shared::{
    Candidate, CandidateCollection, IngestSettings, KnownCompany, MIN_SOURCES_BEFORE_SEARCH,
    Source, SourceOrigin, SourcePipeline, hostname, max_time, score,
};

use crate::feeds::{feed_sources, parse_feed};
use crate::pages::{page_link_sources, page_source};
use crate::queries::{followup_queries, known_company_queries, mentions_any, seed_queries};
use crate::rank::{dedupe_sources, rank_sources};
use crate::search::{SearchProvider, SearchRequest, SearchResult};
use crate::{MIN_SOURCE_SCORE, canonical_url};

/// Output of the new-discovery strategies.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredSources {
    /// Everything collected, deduplicated (for provenance tallies).
    pub collected: Vec<Source>,
    /// Must-include pages plus the ranked, budgeted remainder.
    pub to_parse: Vec<Source>,
}

/// Gathers sources according to [`IngestSettings`].
pub struct Collector<'a> {
    settings: &'a IngestSettings,
    fetcher: Fetcher,
    search: Option<Arc<dyn SearchProvider>>,
    search_disabled_warning: Once,
}

impl<'a> Collector<'a> {
    /// `search` is `None` when the provider key is missing; search-based
    /// strategies then yield nothing.
    pub fn new(
        settings: &'a IngestSettings,
        fetcher: Fetcher,
        search: Option<Arc<dyn SearchProvider>>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            search,
            search_disabled_warning: Once::new(),
        }
    }

    fn provider(&self) -> Option<&dyn SearchProvider> {
        if self.search.is_none() {
            self.search_disabled_warning
                .call_once(|| warn!("search provider key missing; search strategies disabled"));
        }
        self.search.as_deref()
    }

    fn request(&self, query: String) -> SearchRequest {
        let search = self.settings.search();
        SearchRequest {
            query,
            days: self.settings.lookback_days(),
            topic: search.topic,
            depth: search.depth,
            max_results: search.max_results,
            include_domains: Vec::new(),
        }
    }

    /// Run one query, logging and swallowing failures.
    async fn run_query(&self, provider: &dyn SearchProvider, request: &SearchRequest) -> Vec<SearchResult> {
        match provider.search(request).await {
            Ok(results) => {
                debug!(query = %request.query, results = results.len(), "search results");
                results
            }
            Err(e) => {
                warn!(query = %request.query, error = %e, "search failed");
                Vec::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // New discovery
    // -----------------------------------------------------------------------

    /// Recent, relevant feed items.
    #[instrument(skip_all, fields(feeds = self.settings.feeds.len()))]
    pub async fn collect_feeds(&self) -> Vec<Source> {
        let fetched = self
            .fetcher
            .fetch_all(&self.settings.feeds, self.settings.concurrency)
            .await;
        let now = Utc::now();
        let lookback = self.settings.lookback_days();

        let mut sources = Vec::new();
        for (feed_url, result) in fetched {
            let items = match result.and_then(|xml| parse_feed(&xml)) {
                Ok(items) => items,
                Err(e) => {
                    warn!(url = %feed_url, error = %e, "feed skipped");
                    continue;
                }
            };
            let kept = feed_sources(items, lookback, now);
            debug!(url = %feed_url, kept = kept.len(), "feed parsed");
            sources.extend(kept);
        }
        sources
    }

    /// Each fetch-allowed discovery page plus its allowed outbound links.
    #[instrument(skip_all, fields(pages = self.settings.discovery_pages.len()))]
    pub async fn collect_pages(&self) -> Vec<Source> {
        let policy = &self.settings.domains;
        let pages = self.fetchable_pages();
        let fetched = self.fetcher.fetch_all(&pages, self.settings.concurrency).await;

        let mut sources = Vec::new();
        for (page_url, result) in fetched {
            sources.push(page_source(&page_url));
            match result {
                Ok(html) => sources.extend(page_link_sources(
                    &page_url,
                    &html,
                    policy,
                    self.settings.max_discovery_links_per_page,
                )),
                Err(e) => warn!(url = %page_url, error = %e, "discovery page fetch failed"),
            }
        }
        sources
    }

    /// Configured discovery pages the domain policy lets us fetch.
    fn fetchable_pages(&self) -> Vec<String> {
        self.settings
            .discovery_pages
            .iter()
            .filter(|p| self.settings.domains.is_fetch_allowed(p))
            .cloned()
            .collect()
    }

    /// Configured queries; results must score on their title alone.
    #[instrument(skip_all, fields(queries = self.settings.queries.len()))]
    pub async fn collect_search(&self) -> Vec<Source> {
        let Some(provider) = self.provider() else {
            return Vec::new();
        };

        let mut sources = Vec::new();
        for query in &self.settings.queries {
            let request = self.request(query.clone());
            for hit in self.run_query(provider, &request).await {
                let Some(url) = hit.url.as_deref() else {
                    continue;
                };
                if score(hit.title.as_deref(), None).score < MIN_SOURCE_SCORE {
                    continue;
                }
                sources.push(
                    search_source(&hit, url, query)
                        .tagged(SourceOrigin::Search, SourcePipeline::NewDiscovery),
                );
            }
        }
        sources
    }

    /// Allow-listed restatements of search hits from outside sites.
    #[instrument(skip_all, fields(candidates = search_sources.len()))]
    pub async fn collect_followups(&self, search_sources: &[Source]) -> Vec<Source> {
        if !self.settings.allowlist_followup {
            return Vec::new();
        }
        let Some(provider) = self.provider() else {
            return Vec::new();
        };

        let policy = &self.settings.domains;
        let budget = self.settings.followup_max_total;
        let mut sources = Vec::new();

        'outer: for origin in search_sources {
            let outside = hostname(&origin.url).is_some_and(|h| policy.is_unlisted_host(&h));
            let Some(title) = origin.title.as_deref().filter(|_| outside) else {
                continue;
            };

            for query in followup_queries(title, self.settings.followup_max_queries) {
                if sources.len() >= budget {
                    break 'outer;
                }
                let mut request = self.request(query.clone());
                request.max_results = self.settings.followup_max_results;
                request.include_domains = policy.allowed.clone();

                for hit in self.run_query(provider, &request).await {
                    let Some(url) = hit.url.as_deref() else {
                        continue;
                    };
                    if !policy.is_fetch_allowed(url) {
                        continue;
                    }
                    sources.push(
                        search_source(&hit, url, &query)
                            .tagged(SourceOrigin::AllowlistFollowup, SourcePipeline::NewDiscovery),
                    );
                    if sources.len() >= budget {
                        break 'outer;
                    }
                }
            }
        }

        info!(followups = sources.len(), "allow-list follow-ups collected");
        sources
    }

    /// Feeds and pages, then search when forced or thin, then follow-ups;
    /// deduplicated, ranked and cut to the parse budget.
    #[instrument(skip_all)]
    pub async fn collect_new_discovery(&self) -> DiscoveredSources {
        let feeds = self.collect_feeds().await;
        info!(sources = feeds.len(), "feed items collected");
        let mut collected = dedupe_sources(feeds);

        let pages = self.collect_pages().await;
        info!(sources = pages.len(), "discovery items collected");
        collected = dedupe_sources(collected.into_iter().chain(pages));

        if self.settings.force_search || collected.len() < MIN_SOURCES_BEFORE_SEARCH {
            let search = self.collect_search().await;
            info!(sources = search.len(), "search items collected");
            let followups = self.collect_followups(&search).await;
            collected = dedupe_sources(collected.into_iter().chain(search).chain(followups));
        }

        let to_parse = rank_sources(
            &collected,
            &self.fetchable_pages(),
            self.settings.max_sources_to_parse,
        );
        info!(
            collected = collected.len(),
            to_parse = to_parse.len(),
            "sources ranked for parsing"
        );
        DiscoveredSources { collected, to_parse }
    }

    // -----------------------------------------------------------------------
    // Targeted searches
    // -----------------------------------------------------------------------

    /// Fresh coverage of stored companies, attributed by name mention.
    ///
    /// `companies` is expected oldest-verified first; only companies with at
    /// least one attributed result produce a candidate.
    #[instrument(skip_all, fields(companies = companies.len()))]
    pub async fn collect_known_updates(&self, companies: &[KnownCompany]) -> CandidateCollection {
        let mut collection = CandidateCollection::default();
        let Some(provider) = self.provider() else {
            return collection;
        };

        let cap = self.settings.known_max.unwrap_or(usize::MAX);
        for company in companies.iter().take(cap) {
            let names: Vec<&str> = std::iter::once(company.name.as_str())
                .chain(company.aliases.iter().map(String::as_str))
                .collect();

            let mut candidate = Candidate::new(&company.name);
            candidate.website_url = company.website_url.clone();
            candidate.canonical_domain = company.canonical_domain.clone();
            company.aliases.iter().for_each(|a| candidate.add_alias(a));

            for query in known_company_queries(&company.name, self.settings.known_query_limit) {
                let request = self.request(query.clone());
                for hit in self.run_query(provider, &request).await {
                    let Some(url) = hit.url.as_deref() else {
                        continue;
                    };
                    let on_own_domain = company
                        .canonical_domain
                        .as_deref()
                        .zip(hostname(url))
                        .is_some_and(|(domain, host)| host == domain);
                    let mentioned = hit
                        .title
                        .as_deref()
                        .is_some_and(|t| mentions_any(t, names.iter().copied()));
                    if !(mentioned || on_own_domain) {
                        continue;
                    }
                    let source = search_source(&hit, url, &query)
                        .tagged(SourceOrigin::Search, SourcePipeline::KnownUpdates);
                    candidate.last_verified_at =
                        max_time(candidate.last_verified_at, source.published_at);
                    collection.sources.push(source.clone());
                    candidate.add_source(source);
                }
            }

            if !candidate.sources.is_empty() {
                collection.candidates.push(candidate);
            }
        }

        info!(
            candidates = collection.candidates.len(),
            sources = collection.sources.len(),
            "known-company updates collected"
        );
        collection
    }

    /// One candidate per seed name, with any results that mention it.
    #[instrument(skip_all, fields(seeds = seeds.len()))]
    pub async fn collect_seed_universe(&self, seeds: &[String]) -> CandidateCollection {
        let mut collection = CandidateCollection::default();
        let provider = self.provider();

        let cap = self.settings.seed_max.unwrap_or(usize::MAX);
        for name in seeds.iter().take(cap) {
            let mut candidate = Candidate::new(name);

            if let Some(provider) = provider {
                for query in seed_queries(name, self.settings.seed_query_limit) {
                    let request = self.request(query.clone());
                    for hit in self.run_query(provider, &request).await {
                        let Some(url) = hit.url.as_deref() else {
                            continue;
                        };
                        if !hit.title.as_deref().is_some_and(|t| mentions_any(t, [name.as_str()])) {
                            continue;
                        }
                        let source = search_source(&hit, url, &query)
                            .tagged(SourceOrigin::SeedSearch, SourcePipeline::SeedBootstrap);
                        candidate.last_verified_at =
                            max_time(candidate.last_verified_at, source.published_at);
                        collection.sources.push(source.clone());
                        candidate.add_source(source);
                    }
                }
            }

            collection.candidates.push(candidate);
        }

        info!(
            candidates = collection.candidates.len(),
            sources = collection.sources.len(),
            "seed universe collected"
        );
        collection
    }
}

fn search_source(hit: &SearchResult, url: &str, query: &str) -> Source {
    let mut source = Source::new(canonical_url(url));
    source.title = hit.title.clone();
    source.publisher = hit.publisher.clone().or_else(|| hostname(url));
    source.published_at = hit.published_at;
    source.query = Some(query.to_string());
    source
}

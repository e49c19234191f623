//! Discovery-page link harvesting.

use scraper::Html;
use url::Url;

use neolabs_crawler::{links, page_title};
use neolabs_shared::{DomainPolicy, Source, SourceOrigin, SourcePipeline, hostname};

use crate::canonical_url;

/// The discovery page itself, as a source.
pub fn page_source(page_url: &str) -> Source {
    let mut source = Source::new(canonical_url(page_url))
        .tagged(SourceOrigin::Discovery, SourcePipeline::NewDiscovery);
    source.publisher = hostname(page_url);
    source
}

/// Fetch-allowed outbound links from a discovery page, capped at `max_links`.
///
/// Each link is titled with its text, else the page `<title>`.
pub fn page_link_sources(
    page_url: &str,
    html: &str,
    policy: &DomainPolicy,
    max_links: usize,
) -> Vec<Source> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let title = page_title(&doc);
    let publisher = hostname(page_url);

    links(&doc, &base)
        .into_iter()
        .filter(|link| policy.is_fetch_allowed(link.url.as_str()))
        .take(max_links)
        .map(|link| {
            let mut source = Source::new(canonical_url(link.url.as_str()))
                .tagged(SourceOrigin::Discovery, SourcePipeline::NewDiscovery);
            source.title = Some(link.text)
                .filter(|t| !t.is_empty())
                .or_else(|| title.clone());
            source.publisher = publisher.clone();
            source
        })
        .collect()
}

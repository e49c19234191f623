//! Deduplication, ranking and the parse budget.

use std::cmp::Reverse;
use std::collections::HashMap;

use neolabs_shared::{Source, score};

use crate::canonical_url;
use crate::pages::page_source;

/// Collapse sources sharing a canonical URL, first-wins per field.
///
/// Order of first appearance is kept.
pub fn dedupe_sources(sources: impl IntoIterator<Item = Source>) -> Vec<Source> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut deduped: Vec<Source> = Vec::new();

    for mut source in sources {
        source.url = canonical_url(&source.url);
        match index.get(&source.url) {
            Some(&i) => deduped[i].merge(&source),
            None => {
                index.insert(source.url.clone(), deduped.len());
                deduped.push(source);
            }
        }
    }
    deduped
}

/// Sources to parse: every must-include page first, then the rest by
/// `(relevance desc, published desc)`, up to `budget` in total.
///
/// Must-include pages missing from `sources` are added as bare page sources.
/// They are never cut, so more of them than `budget` overflows it; callers
/// pass only pages they are allowed to fetch.
pub fn rank_sources(sources: &[Source], must_include: &[String], budget: usize) -> Vec<Source> {
    let mut selected: Vec<Source> = Vec::new();
    for page in must_include {
        let url = canonical_url(page);
        if selected.iter().any(|s| s.url == url) {
            continue;
        }
        let source = sources
            .iter()
            .find(|s| s.url == url)
            .cloned()
            .unwrap_or_else(|| page_source(page));
        selected.push(source);
    }

    let mut ranked: Vec<(i32, i64, &Source)> = sources
        .iter()
        .filter(|s| !selected.iter().any(|p| p.url == s.url))
        .map(|s| {
            let relevance = score(s.title.as_deref(), s.snippet.as_deref()).score;
            let published = s.published_at.map(|d| d.timestamp_millis()).unwrap_or(0);
            (relevance, published, s)
        })
        .collect();
    ranked.sort_by_key(|(relevance, published, _)| (Reverse(*relevance), Reverse(*published)));

    for (_, _, source) in ranked {
        if selected.len() >= budget {
            break;
        }
        selected.push(source.clone());
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use neolabs_shared::{SourceOrigin, SourcePipeline};

    fn titled(url: &str, title: &str) -> Source {
        let mut s = Source::new(url);
        s.title = Some(title.into());
        s
    }

    #[test]
    fn dedupe_merges_first_wins() {
        let mut first = titled("https://www.techcrunch.com/a/?utm_source=x", "First");
        first.publisher = None;
        let mut second = titled("https://techcrunch.com/a", "Second");
        second.publisher = Some("TechCrunch".into());
        second = second.tagged(SourceOrigin::Search, SourcePipeline::NewDiscovery);

        let deduped = dedupe_sources(vec![first, second, titled("https://techcrunch.com/b", "B")]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].url, "https://techcrunch.com/a");
        assert_eq!(deduped[0].title.as_deref(), Some("First"));
        assert_eq!(deduped[0].publisher.as_deref(), Some("TechCrunch"));
        assert_eq!(deduped[0].origin, Some(SourceOrigin::Search));
    }

    #[test]
    fn must_include_first_then_ranked_within_budget() {
        let mut newer = titled("https://techcrunch.com/new", "AI lab raises seed");
        newer.published_at = Some(Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap());
        let mut older = titled("https://techcrunch.com/old", "AI lab raises seed");
        older.published_at = Some(Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap());
        let strongest = titled(
            "https://techcrunch.com/best",
            "Research lab emerges from stealth with foundation model",
        );
        let weak = titled("https://techcrunch.com/weak", "Startup news");

        let sources = vec![weak, older, newer, strongest];
        let pages = vec!["https://a16z.com/portfolio/".to_string()];

        let ranked = rank_sources(&sources, &pages, 4);
        let urls: Vec<&str> = ranked.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://a16z.com/portfolio",
                "https://techcrunch.com/best",
                "https://techcrunch.com/new",
                "https://techcrunch.com/old",
            ]
        );
    }

    #[test]
    fn must_include_reuses_collected_record() {
        let mut page = titled("https://a16z.com/portfolio", "Portfolio");
        page.publisher = Some("a16z.com".into());
        let ranked = rank_sources(&[page], &["https://a16z.com/portfolio/".into()], 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title.as_deref(), Some("Portfolio"));
    }

    #[test]
    fn must_include_pages_may_exceed_budget() {
        let pages: Vec<String> = (0..3).map(|i| format!("https://a16z.com/p{i}")).collect();
        let sources = vec![titled("https://techcrunch.com/a", "AI lab raises seed")];
        let ranked = rank_sources(&sources, &pages, 2);
        let urls: Vec<&str> = ranked.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, ["https://a16z.com/p0", "https://a16z.com/p1", "https://a16z.com/p2"]);
    }
}

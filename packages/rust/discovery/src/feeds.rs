//! RSS/Atom feed parsing and filtering.

use chrono::{DateTime, Utc};
use scraper::Html;

use neolabs_shared::{
    NeoLabsError, Result, Source, SourceOrigin, SourcePipeline, collapse_whitespace, hostname,
    score,
};

use crate::{MIN_SOURCE_SCORE, canonical_url, is_recent};

/// One entry from a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_title: Option<String>,
    pub snippet: Option<String>,
}

/// Parse an RSS or Atom document.
///
/// The link falls back to the entry id when it looks like a URL; the date is
/// the published time, else the updated time; the snippet is the plain text
/// of the summary, else of the content.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let feed = feed_rs::parser::parse(xml.as_bytes())
        .map_err(|e| NeoLabsError::parse(format!("invalid feed: {e}")))?;
    let feed_title = feed.title.map(|t| collapse_whitespace(&t.content));

    Ok(feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));
            let snippet = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .map(|raw| plain_text(&raw))
                .filter(|s| !s.is_empty());
            FeedItem {
                title: entry
                    .title
                    .map(|t| collapse_whitespace(&t.content))
                    .filter(|t| !t.is_empty()),
                link,
                published_at: entry.published.or(entry.updated),
                feed_title: feed_title.clone().filter(|t| !t.is_empty()),
                snippet,
            }
        })
        .collect())
}

/// Keep titled, linked, recent items that score at least [`MIN_SOURCE_SCORE`].
pub fn feed_sources(items: Vec<FeedItem>, lookback_days: u32, now: DateTime<Utc>) -> Vec<Source> {
    items
        .into_iter()
        .filter_map(|item| {
            let (link, title) = (item.link?, item.title?);
            if !is_recent(item.published_at, lookback_days, now) {
                return None;
            }
            if score(Some(&title), item.snippet.as_deref()).score < MIN_SOURCE_SCORE {
                return None;
            }
            let mut source = Source::new(canonical_url(&link))
                .tagged(SourceOrigin::Rss, SourcePipeline::NewDiscovery);
            source.publisher = item.feed_title.or_else(|| hostname(&link));
            source.title = Some(title);
            source.published_at = item.published_at;
            source.snippet = item.snippet;
            Some(source)
        })
        .collect()
}

fn plain_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    collapse_whitespace(&doc.root_element().text().collect::<String>())
}

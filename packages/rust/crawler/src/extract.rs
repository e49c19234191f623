//! HTML evidence extraction: titles, meta descriptions, JSON-LD
//! organisations, outbound links, and external company websites.
//!
//! Everything here is best-effort: malformed fragments are skipped, never
//! reported as errors.

use std::sync::LazyLock;

use neolabs_shared::{DomainPolicy, collapse_whitespace, hostname};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector"));
static META_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="description"]"#).expect("meta description selector")
});
static OG_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:description"]"#).expect("og description selector")
});
static JSON_LD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("json-ld selector")
});
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));
static IMG_ALT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[alt]").expect("img alt selector"));

/// Organisation names that belong to publishers and investors, not subjects.
const PUBLISHER_NAMES: &[&str] = &[
    "techcrunch",
    "venturebeat",
    "wired",
    "axios",
    "a16z",
    "andreessen horowitz",
    "index ventures",
    "sequoia capital",
    "wikipedia",
];

/// JSON-LD properties that may nest further entities.
const NESTED_FIELDS: &[&str] = &["mentions", "about", "mainEntityOfPage", "mainEntity"];

/// Elements treated as the "card" around a listing link.
const CARD_TAGS: &[&str] = &["article", "li", "section", "div"];

/// An outbound link found on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Absolute URL, fragment removed.
    pub url: Url,
    /// Visible link text, whitespace-collapsed.
    pub text: String,
}

/// Text of the first `<title>`, if non-empty.
pub fn page_title(doc: &Html) -> Option<String> {
    doc.select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// `meta[name=description]`, falling back to `og:description`.
pub fn meta_description(doc: &Html) -> Option<String> {
    [&*META_DESCRIPTION, &*OG_DESCRIPTION]
        .into_iter()
        .find_map(|sel| {
            doc.select(sel)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(str::to_string)
        })
}

/// Names of `Organization` entities in JSON-LD blocks, publishers excluded.
///
/// Walks `@graph` and the nested entity fields recursively. Invalid blocks
/// are ignored.
pub fn json_ld_organizations(doc: &Html) -> Vec<String> {
    let mut names = Vec::new();
    for script in doc.select(&JSON_LD) {
        let raw = script.text().collect::<String>();
        if raw.trim().is_empty() {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        match &parsed {
            Value::Array(items) => items.iter().for_each(|v| visit_json_ld(v, &mut names)),
            other => visit_json_ld(other, &mut names),
        }
    }
    names
}

fn visit_json_ld(node: &Value, names: &mut Vec<String>) {
    let Value::Object(record) = node else {
        return;
    };

    let is_org = match record.get("@type") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("organization"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|t| t.eq_ignore_ascii_case("organization"))),
        _ => false,
    };
    if is_org {
        if let Some(name) = record.get("name").and_then(Value::as_str) {
            let name = name.trim();
            if !name.is_empty()
                && !PUBLISHER_NAMES.contains(&name.to_lowercase().as_str())
                && !names.iter().any(|n| n == name)
            {
                names.push(name.to_string());
            }
        }
    }

    for field in NESTED_FIELDS {
        match record.get(*field) {
            Some(Value::Array(items)) => items.iter().for_each(|v| visit_json_ld(v, names)),
            Some(value) => visit_json_ld(value, names),
            None => {}
        }
    }

    if let Some(Value::Array(graph)) = record.get("@graph") {
        graph.iter().for_each(|v| visit_json_ld(v, names));
    }
}

/// Resolve an `href` against the page URL, skipping anchors and pseudo-schemes.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
    {
        return None;
    }
    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    Some(resolved)
}

/// All resolvable `a[href]` links in document order.
pub fn links(doc: &Html, base: &Url) -> Vec<Link> {
    anchors(doc, base)
        .map(|(el, url)| Link {
            url,
            text: collapse_whitespace(&el.text().collect::<String>()),
        })
        .collect()
}

/// Anchor elements paired with their resolved URL.
pub(crate) fn anchors<'a>(
    doc: &'a Html,
    base: &'a Url,
) -> impl Iterator<Item = (ElementRef<'a>, Url)> + 'a {
    doc.select(&ANCHOR).filter_map(move |el| {
        let href = el.value().attr("href")?;
        resolve_href(base, href).map(|url| (el, url))
    })
}

/// Best label for a listing link: `aria-label`, `title`, `img[alt]`, then text.
pub(crate) fn anchor_label(el: &ElementRef<'_>) -> String {
    let raw = el
        .value()
        .attr("aria-label")
        .or_else(|| el.value().attr("title"))
        .map(str::to_string)
        .or_else(|| {
            el.select(&IMG_ALT)
                .next()
                .and_then(|img| img.value().attr("alt"))
                .map(str::to_string)
        })
        .unwrap_or_else(|| el.text().collect::<String>());
    collapse_whitespace(&raw)
}

/// Text of the nearest enclosing card element, used as listing context.
pub(crate) fn card_context(el: &ElementRef<'_>) -> String {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| CARD_TAGS.contains(&ancestor.value().name()))
        .map(|card| collapse_whitespace(&card.text().collect::<String>()))
        .unwrap_or_default()
}

/// The link most likely to be the subject company's own website.
///
/// Candidates point to a different host that is neither allowed nor denied.
/// Link text mentioning website/home/visit scores +2 and short text +1; the
/// first best-scoring link wins.
pub fn external_website(doc: &Html, page_url: &Url, policy: &DomainPolicy) -> Option<String> {
    let page_host = hostname(page_url.as_str())?;
    let mut best: Option<(i32, String)> = None;

    for link in links(doc, page_url) {
        let Some(host) = hostname(link.url.as_str()) else {
            continue;
        };
        if host == page_host || !policy.is_unlisted_host(&host) {
            continue;
        }

        let text = link.text.to_lowercase();
        let mut score = 0;
        if text.contains("website") || text.contains("home") || text.contains("visit") {
            score += 2;
        }
        if (1..=40).contains(&text.chars().count()) {
            score += 1;
        }

        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, link.url.to_string()));
        }
    }

    best.map(|(_, url)| url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DomainPolicy {
        DomainPolicy::new(
            vec!["techcrunch.com".into(), "a16z.com".into()],
            vec!["linkedin.com".into()],
        )
    }

    #[test]
    fn reads_title_and_meta() {
        let doc = Html::parse_document(
            r#"<html><head><title>  Periodic Labs
               raises $300M </title>
               <meta property="og:description" content="OG text">
               </head><body></body></html>"#,
        );
        assert_eq!(page_title(&doc).as_deref(), Some("Periodic Labs raises $300M"));
        assert_eq!(meta_description(&doc).as_deref(), Some("OG text"));

        let doc = Html::parse_document(
            r#"<meta name="description" content="Plain"><meta property="og:description" content="OG">"#,
        );
        assert_eq!(meta_description(&doc).as_deref(), Some("Plain"));
    }

    #[test]
    fn json_ld_walks_graph_and_filters_publishers() {
        let doc = Html::parse_document(
            r#"<script type="application/ld+json">
            {"@graph": [
              {"@type": "NewsArticle",
               "publisher": {"@type": "Organization", "name": "TechCrunch"},
               "about": [{"@type": ["Thing", "Organization"], "name": "Reflection AI"}],
               "mentions": {"@type": "Organization", "name": "Andreessen Horowitz"}},
              {"@type": "Organization", "name": "TechCrunch"}
            ]}
            </script>
            <script type="application/ld+json">{ not json</script>
            <script type="application/ld+json">[{"@type": "organization", "name": " Reflection AI "}]</script>"#,
        );
        assert_eq!(json_ld_organizations(&doc), vec!["Reflection AI"]);
    }

    #[test]
    fn links_skip_pseudo_schemes_and_fragments() {
        let base = Url::parse("https://a16z.com/news-content/").unwrap();
        let doc = Html::parse_document(
            r##"<a href="/portfolio/#top">Portfolio</a>
               <a href="mailto:hi@a16z.com">Mail</a>
               <a href="javascript:void(0)">JS</a>
               <a href="#section">Jump</a>
               <a href="https://periodic.com">  Periodic
                 Labs </a>"##,
        );
        let found = links(&doc, &base);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].url.as_str(), "https://a16z.com/portfolio/");
        assert_eq!(found[1].text, "Periodic Labs");
    }

    #[test]
    fn external_website_prefers_labelled_unlisted_links() {
        let page = Url::parse("https://techcrunch.com/2025/01/01/story/").unwrap();
        let doc = Html::parse_document(
            r#"<a href="https://techcrunch.com/other">Other story</a>
               <a href="https://www.linkedin.com/company/x">LinkedIn</a>
               <a href="https://a16z.com/">a16z</a>
               <a href="https://cdn.example.net/img.png"></a>
               <a href="https://periodic.com/">Visit website</a>"#,
        );
        assert_eq!(
            external_website(&doc, &page, &policy()).as_deref(),
            Some("https://periodic.com/")
        );
    }

    #[test]
    fn external_website_none_without_candidates() {
        let page = Url::parse("https://techcrunch.com/story").unwrap();
        let doc = Html::parse_document(r#"<a href="/about">About</a>"#);
        assert!(external_website(&doc, &page, &policy()).is_none());
    }

    #[test]
    fn label_and_context_for_listing_cards() {
        let base = Url::parse("https://a16z.com/portfolio/").unwrap();
        let doc = Html::parse_document(
            r#"<ul><li><span>AI research lab</span>
                 <a href="https://one.ai" aria-label="One Labs">x</a></li>
               <li><a href="https://two.ai"><img alt="Two AI"></a></li>
               <li><a href="https://three.ai">Three</a></li></ul>"#,
        );
        let found: Vec<(String, String)> = anchors(&doc, &base)
            .map(|(el, _)| (anchor_label(&el), card_context(&el)))
            .collect();
        assert_eq!(found[0].0, "One Labs");
        assert_eq!(found[0].1, "AI research lab x");
        assert_eq!(found[1].0, "Two AI");
        assert_eq!(found[2].0, "Three");
    }
}

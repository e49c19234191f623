//! Company-name extraction from headline text.

use crate::normalize::collapse_whitespace;

/// Phrases that open a headline about a company ("Announcing X").
const LEADING_MARKERS: &[&str] = &[
    "announcing",
    "introducing",
    "introducing the",
    "meet",
    "backing",
    "investing in",
    "launching",
];

/// Verbs and nouns that typically follow the subject ("X raises ...").
const VERB_MARKERS: &[&str] = &[
    "raises",
    "raised",
    "lands",
    "lands a",
    "closes",
    "secures",
    "snags",
    "announces",
    "announcing",
    "launches",
    "debuts",
    "unveils",
    "introduces",
    "introducing",
    "introducing the",
    "releases",
    "opens",
    "spins",
    "acquires",
    "buys",
    "backs",
    "backing",
    "invests in",
    "investing in",
    "funds",
    "emerges from stealth",
    "funding",
    "seed",
    "series",
    "round",
];

const SEPARATORS: &[&str] = &[":", " - ", " | "];

const MAX_NAME_WORDS: usize = 5;

/// Best-guess company name from a headline, or `None`.
///
/// Tries, in order: a leading marker, the text before a verb marker, then the
/// text before a `:`, ` - ` or ` | ` separator. Each guess must be at most
/// five words.
pub fn company_name_from_title(title: &str) -> Option<String> {
    let trimmed = collapse_whitespace(title);
    // ASCII lower-casing keeps byte offsets aligned with `trimmed`.
    let lower = trimmed.to_ascii_lowercase();

    for marker in LEADING_MARKERS {
        if lower.starts_with(&format!("{marker} ")) {
            if let Some(name) = accept(&trimmed[marker.len()..]) {
                return Some(name);
            }
        }
    }

    for marker in VERB_MARKERS {
        if let Some(idx) = lower.find(&format!(" {marker} ")) {
            if idx > 1 {
                if let Some(name) = accept(&trimmed[..idx]) {
                    return Some(name);
                }
            }
        }
    }

    for separator in SEPARATORS {
        if let Some(idx) = trimmed.find(separator) {
            if idx > 0 {
                if let Some(name) = accept(&trimmed[..idx]) {
                    return Some(name);
                }
            }
        }
    }

    None
}

fn accept(raw: &str) -> Option<String> {
    let name = clean_candidate(raw);
    (!name.is_empty() && name.split(' ').count() <= MAX_NAME_WORDS).then_some(name)
}

/// Strip quotes and any trailing ` - ...` / ` — ...` tail.
fn clean_candidate(raw: &str) -> String {
    let unquoted: String = raw
        .chars()
        .filter(|c| !matches!(c, '“' | '”' | '"' | '\''))
        .collect();
    let mut text = collapse_whitespace(&unquoted);
    for tail in [" - ", " — "] {
        if let Some(idx) = text.find(tail) {
            text.truncate(idx);
        }
    }
    collapse_whitespace(&text)
}

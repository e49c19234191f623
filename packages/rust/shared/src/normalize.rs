//! Company-name normalisation and list parsing.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

/// Normalized comparison form of a company name.
///
/// Lower-cases, keeps only ASCII letters, digits, whitespace, `&` and `-`,
/// and collapses runs of whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = collapse_whitespace(name).to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '&' || *c == '-')
        .collect();
    collapse_whitespace(&kept)
}

/// Trim and collapse every whitespace run to one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Union of two alias lists, normalized, in sorted order.
pub fn merge_aliases<'a>(
    left: impl IntoIterator<Item = &'a String>,
    right: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    left.into_iter()
        .chain(right)
        .map(|a| normalize_name(a))
        .filter(|a| !a.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Later of two optional timestamps; a present value beats an absent one.
pub fn max_time(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Parse a one-name-per-line list, dropping blanks and `#` comments.
pub fn parse_name_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

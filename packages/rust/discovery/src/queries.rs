//! Query templates for follow-up, known-company and seed searches, plus the
//! name-mention test used to attribute results without entity resolution.

use neolabs_shared::{company_name_from_title, normalize_name};

const KNOWN_TEMPLATES: &[&str] = &["\"{name}\" AI lab funding", "\"{name}\" startup", "\"{name}\" raises"];
const SEED_TEMPLATES: &[&str] = &["\"{name}\" AI lab", "\"{name}\" founded"];

fn fill(templates: &[&str], name: &str, limit: usize) -> Vec<String> {
    templates
        .iter()
        .take(limit)
        .map(|t| t.replace("{name}", name))
        .collect()
}

/// Queries for refreshing a stored company.
pub fn known_company_queries(name: &str, limit: usize) -> Vec<String> {
    fill(KNOWN_TEMPLATES, name, limit)
}

/// Queries for a seed-universe name.
pub fn seed_queries(name: &str, limit: usize) -> Vec<String> {
    fill(SEED_TEMPLATES, name, limit)
}

/// Queries that look for an allow-listed restatement of an outside story:
/// the exact title, then the title's company name plus "funding".
pub fn followup_queries(title: &str, limit: usize) -> Vec<String> {
    let title = title.trim();
    if title.is_empty() {
        return Vec::new();
    }
    let mut queries = vec![format!("\"{title}\"")];
    if let Some(name) = company_name_from_title(title) {
        queries.push(format!("{name} funding"));
    }
    queries.truncate(limit);
    queries
}

/// Whether `text` mentions any of `names` as whole words (normalized).
///
/// Possessives count as mentions: "Reka's" mentions "Reka".
pub fn mentions_any<'a>(text: &str, names: impl IntoIterator<Item = &'a str>) -> bool {
    let words: Vec<&str> = text.split_whitespace().map(strip_possessive).collect();
    let haystack = format!(" {} ", normalize_name(&words.join(" ")));
    names.into_iter().any(|name| {
        let needle = normalize_name(name);
        !needle.is_empty() && haystack.contains(&format!(" {needle} "))
    })
}

fn strip_possessive(word: &str) -> &str {
    let core = word.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '\u{2019}');
    ["'s", "'S", "\u{2019}s", "\u{2019}S", "'", "\u{2019}"]
        .iter()
        .find_map(|suffix| core.strip_suffix(suffix))
        .unwrap_or(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_respect_limit() {
        assert_eq!(known_company_queries("Reka", 1), ["\"Reka\" AI lab funding"]);
        assert_eq!(known_company_queries("Reka", 9).len(), 3);
        assert_eq!(seed_queries("Reka", 2), ["\"Reka\" AI lab", "\"Reka\" founded"]);
        assert!(seed_queries("Reka", 0).is_empty());
    }

    #[test]
    fn possessive_headlines_mention_the_company() {
        assert!(mentions_any("Reka's new model tops benchmarks", ["Reka"]));
        assert!(mentions_any("Mistral AI\u{2019}s CEO says", ["Mistral AI"]));
        assert!(mentions_any("A look at Reka's.", ["Reka"]));
        assert!(mentions_any("Investors' bets on Reka", ["Reka"]));
        assert!(!mentions_any("Rekall's launch", ["Reka"]));
    }

    #[test]
    fn followups_from_title() {
        assert_eq!(
            followup_queries("Reka raises $58M for multimodal models", 2),
            ["\"Reka raises $58M for multimodal models\"", "Reka funding"]
        );
        assert_eq!(followup_queries("The week in AI", 2), ["\"The week in AI\""]);
        assert_eq!(followup_queries("Reka raises", 1).len(), 1);
        assert!(followup_queries("  ", 2).is_empty());
    }

    #[test]
    fn mention_is_word_bounded() {
        assert!(mentions_any("Reka AI raises $58M", ["Reka"]));
        assert!(mentions_any("Inside Periodic Labs", ["Nope", "periodic labs"]));
        assert!(!mentions_any("Rekall ships a product", ["Reka"]));
        assert!(!mentions_any("anything", [""]));
    }
}

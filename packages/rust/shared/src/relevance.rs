//! Lexicon-based relevance scoring for AI-lab news and listings.
//!
//! Scores are signed integers. Each phrase in a lexicon contributes its weight
//! at most once, regardless of how often it appears.

use serde::Serialize;

use crate::normalize::collapse_whitespace;

/// Phrases that signal an early-stage AI lab story.
const POSITIVE: &[(&str, i32)] = &[
    ("research lab", 4),
    ("ai lab", 4),
    ("ai research", 3),
    ("research institute", 4),
    ("research", 2),
    ("laboratory", 2),
    ("institute", 2),
    ("lab", 2),
    ("foundation model", 4),
    ("foundational model", 3),
    ("frontier model", 3),
    ("frontier", 2),
    ("model", 1),
    ("agent", 1),
    ("robotics", 1),
    ("stealth", 2),
    ("emerges from stealth", 4),
    ("superintelligence", 3),
    ("alignment", 2),
    ("safety", 2),
    ("agi", 3),
    ("raises", 3),
    ("raised", 3),
    ("seed", 2),
    ("series a", 2),
    ("series b", 2),
    ("funding", 2),
    ("round", 1),
    ("startup", 2),
    ("founded", 1),
    ("ex-openai", 3),
    ("ex deepmind", 3),
    ("deepmind", 1),
    ("openai", 1),
];

/// Off-topic entities and legal/regulatory terms.
const NEGATIVE: &[(&str, i32)] = &[
    ("supreme court", 8),
    ("court", 5),
    ("government", 4),
    ("regulator", 3),
    ("whatsapp", 6),
    ("waymo", 6),
    ("spacex", 6),
    ("tesla", 5),
    ("microsoft", 5),
    ("google", 5),
    ("meta", 5),
    ("elon musk", 5),
    ("plans", 2),
    ("preview", 2),
    ("review", 2),
    ("opinion", 2),
    ("podcast", 2),
];

const INTERROGATIVE_PREFIXES: &[&str] = &["how to ", "why ", "what "];
const INTERROGATIVE_PENALTY: i32 = 2;

/// Terms that disqualify a string from being a company name.
const HARD_REJECT: &[&str] = &[
    "supreme court",
    "court",
    "government",
    "railway",
    "valley",
    "plans",
    "whatsapp",
    "waymo",
    "spacex",
];

const MAX_NAME_CHARS: usize = 60;
const MAX_NAME_WORDS: usize = 6;

/// Score plus the phrases that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relevance {
    pub score: i32,
    pub reasons: Vec<String>,
}

/// Score a title/snippet pair against the lexicons.
pub fn score(title: Option<&str>, snippet: Option<&str>) -> Relevance {
    let title = title.unwrap_or("");
    let text = collapse_whitespace(&format!("{title} {}", snippet.unwrap_or(""))).to_lowercase();
    if text.is_empty() {
        return Relevance {
            score: 0,
            reasons: vec!["empty".into()],
        };
    }

    let mut score = 0;
    let mut reasons = Vec::new();

    for (phrase, weight) in POSITIVE {
        if text.contains(phrase) {
            score += weight;
            reasons.push(format!("+{weight}:{phrase}"));
        }
    }
    for (phrase, weight) in NEGATIVE {
        if text.contains(phrase) {
            score -= weight;
            reasons.push(format!("-{weight}:{phrase}"));
        }
    }

    let lowered_title = collapse_whitespace(title).to_lowercase();
    if INTERROGATIVE_PREFIXES
        .iter()
        .any(|p| lowered_title.starts_with(p))
    {
        score -= INTERROGATIVE_PENALTY;
        reasons.push(format!("-{INTERROGATIVE_PENALTY}:how/why/what"));
    }

    Relevance { score, reasons }
}

/// Cheap plausibility test for a company name.
pub fn is_likely_company_name(name: &str) -> bool {
    let trimmed = collapse_whitespace(name);
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_CHARS {
        return false;
    }
    if trimmed.split(' ').count() > MAX_NAME_WORDS {
        return false;
    }
    let lowered = trimmed.to_lowercase();
    !HARD_REJECT.iter().any(|term| lowered.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_scores_zero() {
        let r = score(None, Some("   "));
        assert_eq!(r.score, 0);
        assert_eq!(r.reasons, vec!["empty"]);
    }

    #[test]
    fn phrases_count_once() {
        let once = score(Some("Seed"), None);
        let twice = score(Some("seed seed seed"), None);
        assert_eq!(once.score, twice.score);
        assert_eq!(once.score, 2);
    }

    #[test]
    fn lab_funding_story_scores_high() {
        let r = score(
            Some("Periodic Labs emerges from stealth with $300M seed"),
            Some("The AI research lab was founded by ex-OpenAI staff."),
        );
        assert!(r.score >= 10, "score was {}", r.score);
        assert!(r.reasons.iter().any(|x| x == "+4:emerges from stealth"));
    }

    #[test]
    fn off_topic_story_is_penalised() {
        let r = score(Some("Supreme Court rules on Google case"), None);
        assert!(r.score < 0);
        assert!(r.reasons.iter().any(|x| x == "-8:supreme court"));
    }

    #[test]
    fn interrogative_title_penalty() {
        let plain = score(Some("AI lab funding"), None);
        let question = score(Some("Why AI lab funding"), None);
        assert_eq!(plain.score - question.score, 2);
        assert!(question.reasons.iter().any(|x| x == "-2:how/why/what"));
    }

    #[test]
    fn company_name_likelihood() {
        assert!(is_likely_company_name("Safe Superintelligence"));
        assert!(!is_likely_company_name(""));
        assert!(!is_likely_company_name("one two three four five six seven"));
        assert!(!is_likely_company_name(&"x".repeat(61)));
        assert!(!is_likely_company_name("Waymo expands"));
        assert!(!is_likely_company_name("Silicon Valley"));
    }
}

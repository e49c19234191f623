//! Refresh reconciliation: fold a deep-research result into a stored company.
//!
//! Dynamic fields (website, domain, headcount, revenue, status) take any
//! non-empty new value. Static fields (description, focus, HQ, founding year)
//! are only filled when the stored record has none. Valuations need a cited
//! basis; otherwise one is scanned out of citation excerpts.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use neolabs_shared::{
    CompanyStatus, FundingRound, KnownCompany, RefreshUpdate, Source, VALUATION_ROUND_TYPE,
    hostname, normalize_url,
};

use crate::research::{Citation, FieldBasis, ProfileRound, ResearchResult};

/// Sources kept per reconciliation.
pub const MAX_REFRESH_SOURCES: usize = 10;

/// Funding rounds kept per reconciliation.
pub const MAX_REFRESH_ROUNDS: usize = 5;

const MAX_INVESTORS: usize = 12;

/// Smallest scanned figure taken as a valuation.
const MIN_SCANNED_VALUATION: f64 = 1e6;

static VALUATION_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"valuation|valued|post-money|pre-money|worth").expect("valid regex")
});

static MONEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\$)?\s*(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)\s*(billion|million|thousand|bn|m|b|k)?\b")
        .expect("valid regex")
});

/// What to write back for one company.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub update: RefreshUpdate,
    pub sources: Vec<Source>,
    pub funding_rounds: Vec<FundingRound>,
}

/// Merge `result` into `existing`, stamping `now` as the verification time.
pub fn reconcile(existing: &KnownCompany, result: &ResearchResult, now: DateTime<Utc>) -> Reconciliation {
    let profile = &result.content;
    let basis = result.basis.as_slice();

    let website_url = non_empty(profile.website_url.as_deref());
    let canonical_domain = non_empty(profile.canonical_domain.as_deref())
        .or_else(|| website_url.as_deref().and_then(hostname));

    let mut update = RefreshUpdate::stamped(now);
    update.website_url = website_url;
    update.canonical_domain = canonical_domain;
    update.employee_count = positive(profile.employee_count).and_then(|n| u32::try_from(n).ok());
    update.known_revenue = non_empty(profile.known_revenue.as_deref());
    update.status = non_empty(profile.status.as_deref()).and_then(|s| s.parse::<CompanyStatus>().ok());

    if is_blank(existing.description.as_deref()) {
        update.description = non_empty(profile.description.as_deref());
    }
    if is_blank(existing.focus.as_deref()) {
        update.focus = non_empty(profile.focus.as_deref());
    }
    if is_blank(existing.hq_location.as_deref()) {
        update.hq_location = non_empty(profile.hq_location.as_deref());
    }
    if existing.founded_year.is_none_or(|y| y <= 0) {
        update.founded_year = positive(profile.founded_year).and_then(|y| i32::try_from(y).ok());
    }

    // --- Valuation ---
    let valuation_basis = basis_for(basis, &["valuation_usd", "valuation"]);
    let valuation_cited = has_citation(valuation_basis);
    let mut valuation_usd = positive(profile.valuation_usd).filter(|_| valuation_cited);
    let mut valuation_source_url = non_empty(profile.valuation_source_url.as_deref());
    if valuation_cited && valuation_source_url.is_none() {
        valuation_source_url = valuation_basis.and_then(first_citation_url);
    }
    if valuation_usd.is_none() {
        if let Some((value, url)) = valuation_from_citations(basis) {
            valuation_usd = Some(value);
            valuation_source_url.get_or_insert(url);
        }
    }

    // --- Sources ---
    let mut sources: Vec<Source> = Vec::new();
    for raw in profile.sources.iter().flatten() {
        let Some(url) = non_empty(raw.url.as_deref()) else {
            continue;
        };
        let url = normalize_url(&url).unwrap_or(url);
        if sources.iter().any(|s| s.url == url) {
            continue;
        }
        let mut source = Source::new(url);
        source.title = non_empty(raw.title.as_deref());
        source.publisher = non_empty(raw.publisher.as_deref());
        source.published_at = raw.published_at.as_deref().and_then(parse_timestamp);
        sources.push(source);
    }
    sources.truncate(MAX_REFRESH_SOURCES);

    // --- Funding rounds ---
    let rounds_cited = has_citation(basis_for(basis, &["funding_rounds"]));
    let mut funding_rounds: Vec<FundingRound> = Vec::new();
    for raw in profile.funding_rounds.iter().flatten() {
        let round = funding_round(raw, rounds_cited);
        if round.is_empty() || funding_rounds.iter().any(|r| r.same_identity(&round)) {
            continue;
        }
        funding_rounds.push(round);
    }
    if let Some(valuation) = valuation_usd {
        let synthetic = FundingRound {
            round_type: Some(VALUATION_ROUND_TYPE.to_string()),
            amount_usd: None,
            valuation_usd: Some(valuation),
            announced_at: profile.valuation_as_of.as_deref().and_then(parse_date),
            investors: Vec::new(),
            source_url: valuation_source_url,
        };
        if !funding_rounds.iter().any(|r| r.same_identity(&synthetic)) {
            funding_rounds.push(synthetic);
        }
    }
    funding_rounds.truncate(MAX_REFRESH_ROUNDS);

    Reconciliation {
        update,
        sources,
        funding_rounds,
    }
}

fn funding_round(raw: &ProfileRound, valuation_cited: bool) -> FundingRound {
    let mut investors: Vec<String> = Vec::new();
    for name in raw.investors.iter().flatten() {
        let name = name.trim();
        if !name.is_empty() && !investors.iter().any(|i| i == name) {
            investors.push(name.to_string());
        }
    }
    investors.truncate(MAX_INVESTORS);

    FundingRound {
        round_type: non_empty(raw.round_type.as_deref()),
        amount_usd: positive(raw.amount_usd),
        valuation_usd: positive(raw.valuation_usd).filter(|_| valuation_cited),
        announced_at: raw.announced_at.as_deref().and_then(parse_date),
        investors,
        source_url: non_empty(raw.source_url.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// Citations
// ---------------------------------------------------------------------------

fn basis_for<'a>(basis: &'a [FieldBasis], fields: &[&str]) -> Option<&'a FieldBasis> {
    basis
        .iter()
        .find(|entry| entry.field.as_deref().is_some_and(|f| fields.contains(&f)))
}

fn cited_urls(entry: &FieldBasis) -> impl Iterator<Item = &str> {
    entry
        .citations
        .iter()
        .filter_map(|c| c.url.as_deref())
        .filter(|u| !u.trim().is_empty())
}

fn has_citation(entry: Option<&FieldBasis>) -> bool {
    entry.is_some_and(|e| cited_urls(e).next().is_some())
}

fn first_citation_url(entry: &FieldBasis) -> Option<String> {
    cited_urls(entry).next().map(|u| u.trim().to_string())
}

fn citation_text(citation: &Citation) -> Option<String> {
    [&citation.excerpt, &citation.quote, &citation.snippet, &citation.text]
        .into_iter()
        .flatten()
        .find(|t| !t.trim().is_empty())
        .cloned()
        .or_else(|| {
            let joined = citation.excerpts.join(" ");
            (!joined.trim().is_empty()).then_some(joined)
        })
}

/// Largest money figure in `text`, if the text talks about a valuation.
pub fn money_from_text(text: &str) -> Option<u64> {
    if !VALUATION_CONTEXT.is_match(&text.to_lowercase()) {
        return None;
    }
    MONEY
        .captures_iter(text)
        .filter_map(|caps| {
            let amount: f64 = caps.get(2)?.as_str().replace(',', "").parse().ok()?;
            let multiplier = match caps.get(3).map(|m| m.as_str().to_lowercase()).as_deref() {
                Some("b" | "bn" | "billion") => 1e9,
                Some("m" | "million") => 1e6,
                Some("k" | "thousand") => 1e3,
                // A bare number is only money with a dollar sign.
                _ if caps.get(1).is_some() => 1.0,
                _ => return None,
            };
            positive(Some(amount * multiplier).filter(|v| *v >= MIN_SCANNED_VALUATION))
        })
        .max()
}

/// Best valuation found in any cited excerpt, with the citing URL.
fn valuation_from_citations(basis: &[FieldBasis]) -> Option<(u64, String)> {
    let mut best: Option<(u64, String)> = None;
    for citation in basis.iter().flat_map(|entry| entry.citations.iter()) {
        let Some(url) = non_empty(citation.url.as_deref()) else {
            continue;
        };
        let Some(value) = citation_text(citation).as_deref().and_then(money_from_text) else {
            continue;
        };
        if best.as_ref().is_none_or(|(current, _)| value > *current) {
            best = Some((value, url));
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Finite positive numbers, rounded to whole units.
fn positive(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.round() as u64)
        .filter(|v| *v > 0)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::research::{CompanyProfile, ProfileSource};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
    }

    fn existing() -> KnownCompany {
        KnownCompany {
            id: "c1".into(),
            name: "Reka".into(),
            focus: Some("Multimodal models".into()),
            employee_count: Some(20),
            ..Default::default()
        }
    }

    fn cited(field: &str, url: &str) -> FieldBasis {
        FieldBasis {
            field: Some(field.into()),
            citations: vec![Citation {
                url: Some(url.into()),
                ..Default::default()
            }],
        }
    }

    fn result(profile: CompanyProfile, basis: Vec<FieldBasis>) -> ResearchResult {
        ResearchResult {
            content: profile,
            basis,
        }
    }

    #[test]
    fn static_fields_are_first_known_wins() {
        let profile = CompanyProfile {
            focus: Some("Robotics".into()),
            description: Some("  Builds models.  ".into()),
            hq_location: Some("Sunnyvale".into()),
            founded_year: Some(2023.0),
            ..Default::default()
        };
        let reconciled = reconcile(&existing(), &result(profile, vec![]), now());
        assert_eq!(reconciled.update.focus, None);
        assert_eq!(reconciled.update.description.as_deref(), Some("Builds models."));
        assert_eq!(reconciled.update.hq_location.as_deref(), Some("Sunnyvale"));
        assert_eq!(reconciled.update.founded_year, Some(2023));
        assert_eq!(reconciled.update.last_verified_at, now());
    }

    #[test]
    fn dynamic_fields_overwrite() {
        let profile = CompanyProfile {
            employee_count: Some(45.4),
            status: Some("Stealth".into()),
            website_url: Some("https://www.reka.ai/".into()),
            known_revenue: Some(" ".into()),
            ..Default::default()
        };
        let update = reconcile(&existing(), &result(profile, vec![]), now()).update;
        assert_eq!(update.employee_count, Some(45));
        assert_eq!(update.status, Some(CompanyStatus::Stealth));
        assert_eq!(update.canonical_domain.as_deref(), Some("reka.ai"));
        assert_eq!(update.known_revenue, None);
    }

    #[test]
    fn invalid_values_are_dropped() {
        let profile = CompanyProfile {
            employee_count: Some(-3.0),
            status: Some("acquired".into()),
            founded_year: Some(0.0),
            ..Default::default()
        };
        let update = reconcile(&existing(), &result(profile, vec![]), now()).update;
        assert_eq!(update.employee_count, None);
        assert_eq!(update.status, None);
        assert_eq!(update.founded_year, None);
    }

    #[test]
    fn uncorroborated_valuation_is_dropped() {
        let profile = CompanyProfile {
            valuation_usd: Some(1_000_000_000.0),
            ..Default::default()
        };
        let reconciled = reconcile(&existing(), &result(profile, vec![]), now());
        assert!(reconciled.funding_rounds.is_empty());
    }

    #[test]
    fn cited_valuation_becomes_a_round() {
        let profile = CompanyProfile {
            valuation_usd: Some(1_000_000_000.0),
            valuation_as_of: Some("2025-06-01".into()),
            ..Default::default()
        };
        let basis = vec![cited("valuation_usd", "https://techcrunch.com/reka-valuation")];
        let rounds = reconcile(&existing(), &result(profile, basis), now()).funding_rounds;
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].round_type.as_deref(), Some(VALUATION_ROUND_TYPE));
        assert_eq!(rounds[0].valuation_usd, Some(1_000_000_000));
        assert_eq!(rounds[0].announced_at, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(
            rounds[0].source_url.as_deref(),
            Some("https://techcrunch.com/reka-valuation")
        );
    }

    #[test]
    fn valuation_scanned_from_excerpts() {
        let basis = vec![FieldBasis {
            field: Some("description".into()),
            citations: vec![
                Citation {
                    url: Some("https://techcrunch.com/a".into()),
                    excerpt: Some("Reka was valued at $1.5bn after the round.".into()),
                    ..Default::default()
                },
                Citation {
                    url: Some("https://wired.com/b".into()),
                    excerpt: Some("The startup is now worth $3 billion.".into()),
                    ..Default::default()
                },
                Citation {
                    url: None,
                    excerpt: Some("valued at $9 billion".into()),
                    ..Default::default()
                },
            ],
        }];
        let rounds = reconcile(&existing(), &result(CompanyProfile::default(), basis), now())
            .funding_rounds;
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].valuation_usd, Some(3_000_000_000));
        assert_eq!(rounds[0].source_url.as_deref(), Some("https://wired.com/b"));
    }

    #[test]
    fn money_scan_needs_valuation_context() {
        assert_eq!(money_from_text("Raised $50M in seed funding"), None);
        assert_eq!(money_from_text("valued at $300M"), Some(300_000_000));
        assert_eq!(money_from_text("post-money of 750 thousand"), None);
        assert_eq!(money_from_text("post-money of 7.5 million"), Some(7_500_000));
        assert_eq!(money_from_text("valuation in 5 months: $2m"), Some(2_000_000));
        assert_eq!(
            money_from_text("Founded in 2021, the lab's valuation has not been disclosed."),
            None
        );
        assert_eq!(money_from_text("valued at $1,200,000,000"), Some(1_200_000_000));
    }

    #[test]
    fn rounds_dedupe_cap_and_drop_empty() {
        let round = |kind: &str, day: &str| ProfileRound {
            round_type: Some(kind.into()),
            amount_usd: Some(10_000_000.0),
            valuation_usd: Some(50_000_000.0),
            announced_at: Some(day.into()),
            investors: Some(vec![" a16z ".into(), "a16z".into(), "".into()]),
            source_url: None,
        };
        let profile = CompanyProfile {
            funding_rounds: Some(vec![
                round("seed", "2024-01-01"),
                round("seed", "2024-01-01"),
                ProfileRound::default(),
                round("series_a", "2024-06-01"),
                round("series_b", "2024-09-01"),
                round("series_c", "2025-01-01"),
                round("series_d", "2025-03-01"),
                round("series_e", "2025-06-01"),
            ]),
            ..Default::default()
        };
        let rounds = reconcile(&existing(), &result(profile, vec![]), now()).funding_rounds;
        assert_eq!(rounds.len(), MAX_REFRESH_ROUNDS);
        assert_eq!(rounds[0].investors, ["a16z"]);
        assert_eq!(rounds[0].valuation_usd, None, "round valuations need a citation");
        assert_eq!(rounds[1].round_type.as_deref(), Some("series_a"));
    }

    #[test]
    fn sources_dedupe_and_cap() {
        let mut raw: Vec<ProfileSource> = (0..12)
            .map(|i| ProfileSource {
                url: Some(format!("https://techcrunch.com/{i}/")),
                title: Some(format!("Story {i}")),
                publisher: None,
                published_at: Some("not a date".into()),
            })
            .collect();
        raw.insert(
            1,
            ProfileSource {
                url: Some("https://www.techcrunch.com/0?utm_source=x".into()),
                ..Default::default()
            },
        );
        let profile = CompanyProfile {
            sources: Some(raw),
            ..Default::default()
        };
        let sources = reconcile(&existing(), &result(profile, vec![]), now()).sources;
        assert_eq!(sources.len(), MAX_REFRESH_SOURCES);
        assert_eq!(sources[0].url, "https://techcrunch.com/0");
        assert_eq!(sources[0].title.as_deref(), Some("Story 0"));
        assert_eq!(sources[1].url, "https://techcrunch.com/1");
        assert!(sources[0].published_at.is_none());
        assert!(sources[0].origin.is_none());
    }
}

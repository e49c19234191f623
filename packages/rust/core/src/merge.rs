//! Candidate merging across sources.
//!
//! Candidates sharing a merge key fold into one record:
//!
//! | field | rule |
//! |---|---|
//! | name | first seen |
//! | website_url, canonical_domain | first non-null |
//! | aliases | union |
//! | sources | union by canonical URL, first-wins per field |
//! | last_verified_at | latest, present beats absent |
//! | people | union by normalized name, first wins |
//! | funding_rounds | union by round identity, first wins |
//!
//! The fold is associative. The key set, aliases, source URLs and
//! timestamps do not depend on input order; display fields follow the
//! first occurrence.

use std::collections::HashMap;

use neolabs_shared::{Candidate, max_time, normalize_name};

/// Fold `other` into `target`.
pub fn absorb(target: &mut Candidate, other: Candidate) {
    if target.website_url.is_none() {
        target.website_url = other.website_url;
    }
    if target.canonical_domain.is_none() {
        target.canonical_domain = other.canonical_domain;
    }
    target.aliases.extend(other.aliases);
    target.last_verified_at = max_time(target.last_verified_at, other.last_verified_at);

    for source in other.sources {
        target.add_source(source);
    }
    for person in other.people {
        let key = normalize_name(&person.name);
        if !target.people.iter().any(|p| normalize_name(&p.name) == key) {
            target.people.push(person);
        }
    }
    for round in other.funding_rounds {
        if !target.funding_rounds.iter().any(|r| r.same_identity(&round)) {
            target.funding_rounds.push(round);
        }
    }
}

/// Merge candidates by [`Candidate::merge_key`], keeping first-seen order.
pub fn merge_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Vec<Candidate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        let key = candidate.merge_key();
        match index.get(&key) {
            Some(&i) => absorb(&mut merged[i], candidate),
            None => {
                index.insert(key, merged.len());
                merged.push(candidate);
            }
        }
    }
    merged
}

/// Unique normalized names, for the `candidates.unique` tally.
pub fn unique_name_count(candidates: &[Candidate]) -> usize {
    candidates
        .iter()
        .map(|c| normalize_name(&c.name))
        .filter(|n| !n.is_empty())
        .collect::<std::collections::HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{DateTime, TimeZone, Utc};
    use neolabs_shared::{FundingRound, Source, SourceOrigin, SourcePipeline};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, day, 0, 0, 0).unwrap()
    }

    fn candidate(name: &str, url: &str, verified: Option<u32>) -> Candidate {
        let mut c = Candidate::new(name);
        let mut source = Source::new(url).tagged(SourceOrigin::Rss, SourcePipeline::NewDiscovery);
        source.title = Some(format!("{name} story"));
        c.add_source(source);
        c.last_verified_at = verified.map(at);
        c
    }

    fn sample() -> Vec<Candidate> {
        let mut aliased = candidate("Periodic Labs", "https://techcrunch.com/periodic", Some(3));
        aliased.add_alias("Periodic");
        let mut with_site = candidate("periodic labs", "https://a16z.com/periodic", None);
        with_site.website_url = Some("https://periodic.com".into());
        vec![
            aliased,
            candidate("Reka", "https://techcrunch.com/reka", None),
            with_site,
            candidate("Periodic Labs", "https://techcrunch.com/periodic", Some(9)),
            candidate("Reka", "https://wired.com/reka", Some(1)),
            candidate("World Labs", "https://a16z.com/world", Some(5)),
        ]
    }

    /// Order-independent view: key -> (aliases, source urls, last verified).
    fn shape(
        candidates: &[Candidate],
    ) -> BTreeMap<String, (BTreeSet<String>, BTreeSet<String>, Option<DateTime<Utc>>)> {
        candidates
            .iter()
            .map(|c| {
                (
                    c.merge_key(),
                    (
                        c.aliases.clone(),
                        c.sources.iter().map(|s| s.url.clone()).collect(),
                        c.last_verified_at,
                    ),
                )
            })
            .collect()
    }

    #[test]
    fn folds_by_normalized_name() {
        let merged = merge_candidates(sample());
        assert_eq!(merged.len(), 3);

        let periodic = &merged[0];
        assert_eq!(periodic.name, "Periodic Labs");
        assert_eq!(periodic.sources.len(), 2);
        assert_eq!(periodic.last_verified_at, Some(at(9)));
        assert_eq!(periodic.website_url.as_deref(), Some("https://periodic.com"));
        assert!(periodic.aliases.contains("periodic"));
        assert!(periodic.aliases.contains("periodic labs"));

        assert_eq!(merged[1].last_verified_at, Some(at(1)));
    }

    #[test]
    fn partitions_merge_to_the_same_result() {
        let all = sample();
        let whole = merge_candidates(all.clone());

        for split in 0..=all.len() {
            let (left, right) = all.split_at(split);
            let staged = merge_candidates(
                merge_candidates(left.to_vec())
                    .into_iter()
                    .chain(merge_candidates(right.to_vec())),
            );
            assert_eq!(staged, whole, "split at {split}");

            let swapped = merge_candidates(
                merge_candidates(right.to_vec())
                    .into_iter()
                    .chain(merge_candidates(left.to_vec())),
            );
            assert_eq!(shape(&swapped), shape(&whole), "swapped split at {split}");
        }
    }

    #[test]
    fn merging_is_idempotent() {
        let once = merge_candidates(sample());
        let twice = merge_candidates(once.clone().into_iter().chain(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn rounds_union_by_identity() {
        let seed = FundingRound {
            round_type: Some("seed".into()),
            amount_usd: Some(5_000_000),
            ..Default::default()
        };
        let mut a = Candidate::new("Reka");
        a.funding_rounds.push(seed.clone());
        let mut b = Candidate::new("Reka");
        b.funding_rounds.push(seed);
        b.funding_rounds.push(FundingRound {
            round_type: Some("series_a".into()),
            ..Default::default()
        });

        let merged = merge_candidates([a, b]);
        assert_eq!(merged[0].funding_rounds.len(), 2);
    }

    #[test]
    fn unique_names_ignore_case_and_punctuation() {
        let candidates = vec![Candidate::new("Reka"), Candidate::new("REKA."), Candidate::new("World")];
        assert_eq!(unique_name_count(&candidates), 2);
    }
}

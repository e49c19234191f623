//! URL canonicalisation and domain allow/deny matching.

use url::Url;

/// Query parameters that only carry tracking state.
const TRACKING_PARAMS: &[&str] = &[
    "ref",
    "referrer",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "cmpid",
    "ocid",
    "icid",
    "vero_id",
    "vero_conv",
    "igshid",
    "s",
    "spm",
    "guce_referrer",
    "guce_referrer_sig",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Canonical form of a URL, or `None` if it does not parse.
///
/// Drops the fragment and tracking parameters, lower-cases the host, strips a
/// leading `www.` and removes the trailing slash of any non-root path.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);

    if let Some(host) = url.host_str().map(|h| strip_www(&h.to_lowercase()).to_string()) {
        url.set_host(Some(&host)).ok()?;
    }

    // Re-serializing changes encoding, so the query is only rebuilt when a
    // tracking parameter actually goes.
    let total = url.query_pairs().count();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else if kept.len() < total {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// Lower-cased host without a leading `www.`.
pub fn hostname(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(strip_www(&host).to_string())
}

/// Host equals a listed domain or is a subdomain of one.
pub fn host_matches(host: &str, domains: &[String]) -> bool {
    let host = strip_www(host);
    domains.iter().any(|d| {
        let d = d.trim().to_lowercase();
        host == d || host.ends_with(&format!(".{d}"))
    })
}

/// Domain allow/deny lists used to decide what may be fetched.
#[derive(Debug, Clone, Default)]
pub struct DomainPolicy {
    pub allowed: Vec<String>,
    pub denied: Vec<String>,
}

impl DomainPolicy {
    pub fn new(allowed: Vec<String>, denied: Vec<String>) -> Self {
        Self { allowed, denied }
    }

    pub fn is_allowed_host(&self, host: &str) -> bool {
        host_matches(host, &self.allowed)
    }

    pub fn is_denied_host(&self, host: &str) -> bool {
        host_matches(host, &self.denied)
    }

    /// Allowed and not denied.
    pub fn is_fetch_allowed(&self, url: &str) -> bool {
        match hostname(url) {
            Some(host) => self.is_allowed_host(&host) && !self.is_denied_host(&host),
            None => false,
        }
    }

    /// Host is neither allowed nor denied (an "outside" site).
    pub fn is_unlisted_host(&self, host: &str) -> bool {
        !self.is_allowed_host(host) && !self.is_denied_host(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_fragment_and_slash() {
        assert_eq!(
            normalize_url("https://www.example.com/path/?utm_source=foo&gclid=bar#section")
                .as_deref(),
            Some("https://example.com/path")
        );
    }

    #[test]
    fn keeps_non_tracking_params() {
        assert_eq!(
            normalize_url("https://example.com/path/?ref=x&q=y").as_deref(),
            Some("https://example.com/path?q=y")
        );
    }

    #[test]
    fn untouched_query_keeps_its_encoding() {
        assert_eq!(
            normalize_url("https://example.com/search?b&q=ai%20labs").as_deref(),
            Some("https://example.com/search?b&q=ai%20labs")
        );
        assert_eq!(
            normalize_url("https://example.com/search?q=ai%20labs&utm_medium=x").as_deref(),
            Some("https://example.com/search?q=ai+labs")
        );
    }

    #[test]
    fn lowercases_host_and_keeps_root() {
        assert_eq!(
            normalize_url("https://WWW.Example.COM/").as_deref(),
            Some("https://example.com/")
        );
        assert_eq!(
            normalize_url("https://example.com/?q=1").as_deref(),
            Some("https://example.com/?q=1")
        );
    }

    #[test]
    fn unparsable_url_is_none() {
        assert!(normalize_url("not a url").is_none());
        assert!(hostname("::").is_none());
    }

    #[test]
    fn hostname_strips_www() {
        assert_eq!(hostname("https://www.A16Z.com/portfolio").as_deref(), Some("a16z.com"));
    }

    #[test]
    fn domain_policy_matches_subdomains() {
        let policy = DomainPolicy::new(
            vec!["a16z.com".into(), "wikipedia.org".into()],
            vec!["medium.com".into()],
        );
        assert!(policy.is_fetch_allowed("https://en.wikipedia.org/wiki/X"));
        assert!(policy.is_fetch_allowed("https://www.a16z.com/news"));
        assert!(!policy.is_fetch_allowed("https://nota16z.com/"));
        assert!(!policy.is_fetch_allowed("https://blog.medium.com/post"));
        assert!(policy.is_unlisted_host("periodiclabs.ai"));
        assert!(!policy.is_unlisted_host("medium.com"));
    }
}

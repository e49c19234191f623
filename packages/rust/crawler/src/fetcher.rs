//! Time-bounded HTTP fetching for feeds and pages.
//!
//! Every request carries its own timeout; a failed fetch never affects its
//! siblings. Batches run on a semaphore-bounded set of tasks and come back in
//! input order.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use url::Url;

use neolabs_shared::{NeoLabsError, Result};

/// User-Agent string for every outbound request.
pub const USER_AGENT: &str = concat!("NeoLabs/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| NeoLabsError::Network(format!("failed to build HTTP client: {e}")))
}

/// HTML/XML fetcher with SSRF protection.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    /// Allow localhost/private IPs (for tests against local mock servers).
    allow_localhost: bool,
}

impl Fetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Fetch a URL and return its body as text.
    pub async fn fetch_text(&self, raw: &str) -> Result<String> {
        let url = Url::parse(raw).map_err(|e| NeoLabsError::parse(format!("{raw}: {e}")))?;

        if !self.allow_localhost && is_ssrf_target(&url) {
            warn!(%url, "SSRF protection: blocked");
            return Err(NeoLabsError::validation(format!("{url}: blocked target")));
        }

        debug!(%url, "fetching");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| NeoLabsError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NeoLabsError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| NeoLabsError::Network(format!("{url}: body read failed: {e}")))
    }

    /// Fetch many URLs with at most `concurrency` in flight.
    ///
    /// Results are returned in input order, one per URL.
    #[instrument(skip_all, fields(urls = urls.len(), concurrency))]
    pub async fn fetch_all(
        &self,
        urls: &[String],
        concurrency: usize,
    ) -> Vec<(String, Result<String>)> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let fetcher = self.clone();
            let sem = semaphore.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|e| NeoLabsError::Network(format!("semaphore closed: {e}")))?;
                fetcher.fetch_text(&url).await
            }));
        }

        let mut results = Vec::with_capacity(urls.len());
        for (url, handle) in urls.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(NeoLabsError::Network(format!("{url}: task failed: {e}"))),
            };
            results.push((url.clone(), result));
        }
        results
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(Duration::from_secs(5)).unwrap().allow_localhost()
    }

    #[test]
    fn ssrf_blocks_private_and_non_http() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://[::1]/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://printer.local/").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("https://techcrunch.com/feed/").unwrap()));
    }

    #[tokio::test]
    async fn blocks_localhost_by_default() {
        let fetcher = Fetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch_text("http://127.0.0.1:1/").await.unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    #[tokio::test]
    async fn fetches_body_and_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let body = fetcher
            .fetch_text(&format!("{}/ok", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html>hi</html>");

        let err = fetcher
            .fetch_text(&format!("{}/gone", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn timeout_fails_only_that_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fast"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_millis(300))
            .unwrap()
            .allow_localhost();
        let urls = vec![
            format!("{}/slow", server.uri()),
            format!("{}/fast", server.uri()),
        ];
        let results = fetcher.fetch_all(&urls, 2).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, urls[0]);
        assert!(results[0].1.is_err());
        assert_eq!(results[1].1.as_deref().unwrap(), "fast");
    }
}

//! Documentation fetcher: static HTTP with bounded retries, then render fallback.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::{debug, info, instrument, warn};
use url::Url;

use freshdocs_shared::{FreshDocsError, Result, ScrapeConfig};

use crate::ContentSource;
use crate::extract::extract_main_text;
use crate::normalize::normalize_text;
use crate::render::{ChromiumRenderer, RenderBackend};

/// `Accept` header sent with static requests.
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Retrieves a documentation page and returns its normalized main text.
pub struct Fetcher {
    config: ScrapeConfig,
    client: Client,
    renderer: Option<Arc<dyn RenderBackend>>,
}

impl Fetcher {
    /// Create a fetcher; the Chromium renderer is configured when
    /// `render_fallback` is enabled.
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| FreshDocsError::fetch(format!("failed to build HTTP client: {e}")))?;

        let renderer: Option<Arc<dyn RenderBackend>> = if config.render_fallback {
            Some(Arc::new(ChromiumRenderer::new(
                config.render_timeout,
                config.chrome_executable.clone(),
            )))
        } else {
            None
        };

        Ok(Self {
            config,
            client,
            renderer,
        })
    }

    /// Replace the render fallback (or disable it with `None`).
    pub fn with_renderer(mut self, renderer: Option<Arc<dyn RenderBackend>>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Fetch `url` and return its normalized main text.
    ///
    /// The static strategy is attempted `retry_attempts + 1` times with linear
    /// backoff; once exhausted, the render fallback (if any) gets one attempt.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| FreshDocsError::validation(format!("invalid URL '{url}': {e}")))?;
        if !self.config.allow_private_hosts && is_ssrf_target(&parsed) {
            return Err(FreshDocsError::fetch(format!(
                "{url}: refusing to fetch non-HTTP or private target"
            )));
        }

        let mut attempt: u32 = 0;
        let static_err = loop {
            match self.fetch_static(&parsed).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    let delay = self.config.retry_delay * attempt;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "static fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break e,
            }
        };

        let Some(renderer) = &self.renderer else {
            return Err(static_err);
        };

        info!(error = %static_err, "static fetch exhausted, rendering page");
        match renderer.render_text(parsed.as_str()).await {
            Ok(raw) => self.check_length(normalize_text(&raw)),
            Err(render_err) => Err(FreshDocsError::fetch(format!(
                "{static_err}; render fallback failed: {render_err}"
            ))),
        }
    }

    async fn fetch_static(&self, url: &Url) -> Result<String> {
        debug!(%url, "static fetch");

        let response = self
            .client
            .get(url.as_str())
            .header(ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .map_err(|e| FreshDocsError::fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FreshDocsError::fetch(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FreshDocsError::fetch(format!("{url}: body read failed: {e}")))?;

        self.check_length(extract_main_text(&body, self.config.min_content_length))
    }

    fn check_length(&self, text: String) -> Result<String> {
        let length = text.chars().count();
        if length < self.config.min_content_length {
            return Err(FreshDocsError::InsufficientContent {
                length,
                minimum: self.config.min_content_length,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl ContentSource for Fetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        Fetcher::fetch(self, url).await
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

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
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
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = r#"<html><body>
        <nav><a href="/">Home</a></nav>
        <main><article>
            <h1>Borrowing</h1>
            <p>A reference is like a pointer in that it is an address we can follow to access the data stored at that address.</p>
            <p>Unlike a pointer, a reference is guaranteed to point to a valid value of a particular type for the life of that reference.</p>
        </article></main>
    </body></html>"#;

    fn test_config() -> ScrapeConfig {
        ScrapeConfig {
            timeout: Duration::from_secs(5),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(1),
            user_agent: "FreshDocs-Test/1.0".into(),
            min_content_length: 100,
            render_fallback: false,
            render_timeout: Duration::from_secs(5),
            chrome_executable: None,
            allow_private_hosts: true,
        }
    }

    /// Render backend returning a fixed result and counting calls.
    struct ScriptedRenderer {
        result: std::result::Result<String, String>,
        calls: AtomicUsize,
    }

    impl ScriptedRenderer {
        fn new(result: std::result::Result<String, String>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RenderBackend for ScriptedRenderer {
        async fn render_text(&self, _url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(FreshDocsError::fetch)
        }
    }

    async fn request_count(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or_default()
    }

    #[test]
    fn test_ssrf_protection_blocks_file() {
        let url = Url::parse("file:///etc/passwd").expect("url");
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn test_ssrf_protection_blocks_private_ip() {
        for raw in [
            "http://127.0.0.1/admin",
            "http://10.0.0.1/",
            "http://192.168.1.1/",
            "http://100.64.0.1/",
            "http://[::1]/",
            "http://[fd00::1]/",
        ] {
            let url = Url::parse(raw).expect("url");
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
    }

    #[test]
    fn test_ssrf_blocks_local_names() {
        for raw in ["http://localhost:8080/", "http://printer.local/", "http://db.internal/"] {
            let url = Url::parse(raw).expect("url");
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
    }

    #[test]
    fn test_ssrf_protection_allows_public() {
        let url = Url::parse("https://doc.rust-lang.org/book/").expect("url");
        assert!(!is_ssrf_target(&url));
    }

    #[tokio::test]
    async fn static_fetch_returns_main_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book/borrowing"))
            .and(header("user-agent", "FreshDocs-Test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_config()).expect("fetcher");
        let text = fetcher
            .fetch(&format!("{}/book/borrowing", server.uri()))
            .await
            .expect("fetch");

        assert!(text.starts_with("Borrowing"));
        assert!(text.contains("guaranteed to point to a valid value"));
        assert!(!text.contains("Home"));
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_config()).expect("fetcher");
        let text = fetcher.fetch(&server.uri()).await.expect("fetch");

        assert!(text.contains("A reference is like a pointer"));
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_renderer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let rendered = "Rendered docs: ".to_string() + &"closures capture their environment. ".repeat(5);
        let renderer = ScriptedRenderer::new(Ok(rendered));
        let fetcher = Fetcher::new(test_config())
            .expect("fetcher")
            .with_renderer(Some(renderer.clone()));

        let text = fetcher.fetch(&server.uri()).await.expect("fetch");

        assert!(text.starts_with("Rendered docs: closures"));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        // First attempt plus two retries.
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn render_failure_reports_both_strategies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let renderer = ScriptedRenderer::new(Err("chrome not found".into()));
        let fetcher = Fetcher::new(test_config())
            .expect("fetcher")
            .with_renderer(Some(renderer));

        let err = fetcher.fetch(&server.uri()).await.expect_err("should fail");
        let msg = err.to_string();
        assert!(matches!(err, FreshDocsError::Fetch { .. }));
        assert!(msg.contains("HTTP 404"));
        assert!(msg.contains("render fallback failed"));
        assert!(msg.contains("chrome not found"));
    }

    #[tokio::test]
    async fn short_pages_are_insufficient_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body><p>Loading...</p></body></html>"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_config()).expect("fetcher");
        let err = fetcher.fetch(&server.uri()).await.expect_err("should fail");

        assert!(matches!(
            err,
            FreshDocsError::InsufficientContent {
                length: 10,
                minimum: 100
            }
        ));
        // Insufficient content is retried like any transient failure.
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn short_rendered_text_is_insufficient_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_config())
            .expect("fetcher")
            .with_renderer(Some(ScriptedRenderer::new(Ok("  tiny  ".into()))));

        let err = fetcher.fetch(&server.uri()).await.expect_err("should fail");
        assert!(matches!(err, FreshDocsError::InsufficientContent { length: 4, .. }));
    }

    #[tokio::test]
    async fn private_hosts_blocked_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
            .mount(&server)
            .await;

        let config = ScrapeConfig {
            allow_private_hosts: false,
            ..test_config()
        };
        let renderer = ScriptedRenderer::new(Ok("unused".into()));
        let fetcher = Fetcher::new(config)
            .expect("fetcher")
            .with_renderer(Some(renderer.clone()));

        let err = fetcher.fetch(&server.uri()).await.expect_err("blocked");
        assert!(err.to_string().contains("refusing to fetch"));
        assert_eq!(request_count(&server).await, 0);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected() {
        let fetcher = Fetcher::new(test_config()).expect("fetcher");
        let err = fetcher.fetch("not a url").await.expect_err("invalid");
        assert!(matches!(err, FreshDocsError::Validation { .. }));
    }
}

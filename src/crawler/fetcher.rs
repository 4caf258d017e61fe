//! HTTP fetcher implementation
//!
//! This module handles all network access for a harvest run, including:
//! - One cookie-keeping client per run with browser-like default headers
//! - A randomized politeness delay before every fetch
//! - Retry with exponential backoff for transient failures
//! - Body size limits
//! - Rendered fetches: budgeted escalations and unbudgeted fragment-paginated listings

use crate::config::FetchConfig;
use crate::crawler::backoff::{BackoffPolicy, DelayRange, Sleeper, TokioSleeper};
use crate::crawler::render::{CommandRenderer, Renderer};
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Fetch failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// 403/429 that persisted through every retry
    #[error("Blocked by {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },

    #[error("Rendered fetch of {url} failed: {message}")]
    RenderFailed { url: String, message: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Response from {url} exceeds {max_bytes} bytes")]
    TooLarge { url: String, max_bytes: u64 },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// Whether another attempt might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status == 403 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }

    /// The URL the failure refers to
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::HttpStatus { url, .. }
            | Self::Blocked { url, .. }
            | Self::RenderFailed { url, .. }
            | Self::Network { url, .. }
            | Self::TooLarge { url, .. }
            | Self::InvalidUrl { url, .. } => url,
        }
    }

    /// Retries exhausted on a block signal
    fn into_final(self) -> Self {
        match self {
            Self::HttpStatus { url, status } if status == 403 || status == 429 => {
                Self::Blocked { url, status }
            }
            other => other,
        }
    }
}

/// What a fetch is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Listing,
    Item,
    Asset,
}

/// Why a page is fetched through the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPurpose {
    /// A plain fetch found nothing; counts against `max-render-escalations`
    Escalation,
    /// The listing is addressed by URL fragment and has no plain-HTTP form
    Pagination,
}

/// A successful response
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Produced by the renderer rather than a plain GET
    pub rendered: bool,
}

impl RawResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network access used by the harvester
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches a URL with politeness delay and retries
    async fn fetch(&self, url: &Url, kind: FetchKind) -> Result<RawResponse, FetchError>;

    /// Fetches a URL through the renderer
    async fn fetch_rendered(
        &self,
        url: &Url,
        purpose: RenderPurpose,
    ) -> Result<RawResponse, FetchError>;

    /// Visits an entry page so the session picks up its cookies
    async fn warm_up(&self, url: &Url) -> Result<(), FetchError> {
        self.fetch(url, FetchKind::Listing).await.map(|_| ())
    }
}

/// Fetcher backed by a `reqwest` client
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
    delay: DelayRange,
    policy: BackoffPolicy,
    max_bytes: u64,
    sleeper: Arc<dyn Sleeper>,
    renderer: Option<Arc<dyn Renderer>>,
    render_budget: AtomicU32,
}

impl HttpFetcher {
    /// Builds the fetcher and its HTTP client
    ///
    /// # Arguments
    ///
    /// * `config` - Fetch settings
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetcher)` - Ready to use
    /// * `Err(HarvestError)` - A default header is invalid or the client could not be built
    pub fn new(config: &FetchConfig) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::Validation(format!("invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ConfigError::Validation(format!("invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .gzip(true)
            .brotli(true)
            .build()?;

        let renderer = config.render_command.as_deref().and_then(|command| {
            CommandRenderer::from_command_line(
                command,
                Duration::from_secs(config.render_timeout_secs),
            )
            .map(|renderer| Arc::new(renderer) as Arc<dyn Renderer>)
        });

        Ok(Self {
            client,
            user_agents: config.user_agents.clone(),
            delay: DelayRange::from_config(config),
            policy: BackoffPolicy::from_config(config),
            max_bytes: config.max_bytes,
            sleeper: Arc::new(TokioSleeper),
            renderer,
            render_budget: AtomicU32::new(config.max_render_escalations),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Escalations still allowed in this run
    pub fn render_budget(&self) -> u32 {
        self.render_budget.load(Ordering::SeqCst)
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    /// A single GET with no retries
    async fn send_once(&self, url: &Url, kind: FetchKind) -> Result<RawResponse, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(user_agent) = self.pick_user_agent() {
            request = request.header(USER_AGENT, user_agent);
        }
        if kind == FetchKind::Asset {
            request = request.header(ACCEPT, "*/*");
        }

        let mut response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            max_bytes: self.max_bytes,
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(too_large());
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(url, e))? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RawResponse {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
            rendered: false,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, kind: FetchKind) -> Result<RawResponse, FetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        self.sleeper.sleep(self.delay.sample()).await;

        let mut attempt = 0;
        loop {
            debug!("Fetching {:?} {} (attempt {})", kind, url, attempt + 1);
            match self.send_once(url, kind).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!("{}; retrying in {:?}", e, delay);
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into_final()),
            }
        }
    }

    async fn fetch_rendered(
        &self,
        url: &Url,
        purpose: RenderPurpose,
    ) -> Result<RawResponse, FetchError> {
        let failed = |message: &str| FetchError::RenderFailed {
            url: url.to_string(),
            message: message.to_string(),
        };

        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| failed("no renderer configured"))?;

        if purpose == RenderPurpose::Escalation {
            self.render_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .map_err(|_| failed("render budget exhausted"))?;
        }

        self.sleeper.sleep(self.delay.sample()).await;
        debug!("Rendering {} ({:?})", url, purpose);
        let dom = renderer.render(url).await?;

        Ok(RawResponse {
            url: url.clone(),
            status: StatusCode::OK.as_u16(),
            content_type: Some("text/html".to_string()),
            body: dom.into_bytes(),
            rendered: true,
        })
    }
}

fn classify(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> FetchError {
        FetchError::HttpStatus {
            url: "https://example.com/".to_string(),
            status: code,
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(status(403).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(410).is_retryable());
        assert!(FetchError::Timeout {
            url: "https://example.com/".to_string()
        }
        .is_retryable());
        assert!(!FetchError::TooLarge {
            url: "https://example.com/".to_string(),
            max_bytes: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_block_signals_become_blocked() {
        assert!(matches!(
            status(403).into_final(),
            FetchError::Blocked { status: 403, .. }
        ));
        assert!(matches!(
            status(429).into_final(),
            FetchError::Blocked { status: 429, .. }
        ));
        assert_eq!(status(503).into_final(), status(503));
    }

    #[test]
    fn test_build_fetcher() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        assert_eq!(fetcher.render_budget(), 3);
        assert!(fetcher.pick_user_agent().is_some());
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut config = FetchConfig::default();
        config
            .headers
            .insert("Bad Header".to_string(), "value".to_string());
        assert!(matches!(
            HttpFetcher::new(&config),
            Err(HarvestError::Config(ConfigError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse("ftp://example.com/file.pdf").unwrap();
        let result = fetcher.fetch(&url, FetchKind::Asset).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_render_without_renderer() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse("https://example.com/").unwrap();
        let result = fetcher.fetch_rendered(&url, RenderPurpose::Escalation).await;
        assert!(matches!(result, Err(FetchError::RenderFailed { .. })));
        assert_eq!(fetcher.render_budget(), 3);
    }

    struct EchoRenderer;

    #[async_trait]
    impl Renderer for EchoRenderer {
        async fn render(&self, url: &Url) -> Result<String, FetchError> {
            Ok(format!("<html><body>{}</body></html>", url))
        }
    }

    #[tokio::test]
    async fn test_pagination_renders_outside_the_budget() {
        let config = FetchConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            max_render_escalations: 1,
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config)
            .unwrap()
            .with_renderer(Arc::new(EchoRenderer));
        let url = Url::parse("https://www.rbnz.govt.nz/news#first=10").unwrap();

        for _ in 0..3 {
            let page = fetcher
                .fetch_rendered(&url, RenderPurpose::Pagination)
                .await
                .unwrap();
            assert!(page.rendered);
            assert!(page.text().contains("#first=10"));
        }
        assert_eq!(fetcher.render_budget(), 1);

        assert!(fetcher
            .fetch_rendered(&url, RenderPurpose::Escalation)
            .await
            .is_ok());
        assert!(matches!(
            fetcher.fetch_rendered(&url, RenderPurpose::Escalation).await,
            Err(FetchError::RenderFailed { message, .. }) if message.contains("budget")
        ));
    }
}

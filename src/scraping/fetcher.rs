//! Page fetching
//!
//! Plain HTTP GET with a rotating user agent. Errors are split into transient
//! (timeouts, connection failures, 5xx, 429) and permanent (other 4xx) so the
//! retry policy only repeats requests that can succeed on a second try.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;

use super::retry::Transient;
use crate::config::{ScrapingConfig, DEFAULT_USER_AGENTS};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_EN: &str = "en-US,en;q=0.5";

/// Errors that can occur during fetching
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Build from a reqwest error, keeping the timeout/connect distinction
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Self::Request(err.to_string())
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The page is gone for good (404, 410)
    pub fn is_gone(&self) -> bool {
        matches!(self.status(), Some(404) | Some(410))
    }
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Request(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::ContentTooLarge(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Fetches one page as text
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Configuration for the fetch engine
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agents, one picked at random per request
    pub user_agents: Vec<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum response size (bytes)
    pub max_content_size: usize,
    /// Maximum redirects to follow
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_content_size: 10 * 1024 * 1024, // 10 MB
            max_redirects: 10,
        }
    }
}

impl FetchConfig {
    pub fn from_config(config: &ScrapingConfig) -> Self {
        let user_agents: Vec<String> = config
            .user_agents
            .iter()
            .filter(|ua| !ua.trim().is_empty())
            .cloned()
            .collect();
        Self {
            user_agents,
            timeout: config.fetch_timeout(),
            connect_timeout: config.fetch_timeout().min(Duration::from_secs(5)),
            ..Default::default()
        }
    }
}

/// Fetch statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub total_fetches: u64,
    pub successes: u64,
    pub failures: u64,
}

/// reqwest-backed fetcher
pub struct FetchEngine {
    http_client: reqwest::Client,
    config: FetchConfig,
    total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl FetchEngine {
    /// Create a new fetch engine
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
            total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    /// Pick a user agent for the next request
    pub fn pick_user_agent(&self) -> &str {
        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            total_fetches: self.total.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    async fn fetch_http(&self, url: &str) -> Result<String, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let response = self
            .http_client
            .get(parsed)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_EN)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, url));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_content_size {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.config.timeout))?;
        if body.len() > self.config.max_content_size {
            return Err(FetchError::ContentTooLarge(body.len()));
        }
        Ok(body)
    }
}

fn status_error(status: StatusCode, url: &str) -> FetchError {
    FetchError::Status {
        status: status.as_u16(),
        url: url.to_string(),
    }
}

#[async_trait]
impl PageFetcher for FetchEngine {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.total.fetch_add(1, Ordering::Relaxed);
        let result = self.fetch_http(url).await;
        match &result {
            Ok(_) => self.successes.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failures.fetch_add(1, Ordering::Relaxed),
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            status: code,
            url: "https://example.com".to_string(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(FetchError::Connect("refused".to_string()).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());

        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
        assert!(!FetchError::InvalidUrl("nope".to_string()).is_transient());
    }

    #[test]
    fn test_gone_only_for_404_and_410() {
        assert!(status(404).is_gone());
        assert!(status(410).is_gone());
        assert!(!status(403).is_gone());
        assert!(!status(500).is_gone());
        assert!(!FetchError::Timeout(Duration::from_secs(1)).is_gone());
    }

    #[test]
    fn test_user_agent_rotation_stays_in_pool() {
        let engine = FetchEngine::new(FetchConfig::default()).unwrap();
        for _ in 0..20 {
            let ua = engine.pick_user_agent();
            assert!(DEFAULT_USER_AGENTS.contains(&ua));
        }
    }

    #[test]
    fn test_config_drops_blank_user_agents() {
        let mut scraping = ScrapingConfig::default();
        scraping.user_agents = vec!["".to_string(), "agent/1.0".to_string()];
        let config = FetchConfig::from_config(&scraping);
        assert_eq!(config.user_agents, vec!["agent/1.0".to_string()]);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invalid_url_is_permanent() {
        let engine = FetchEngine::new(FetchConfig::default()).unwrap();
        let err = engine.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        assert!(!err.is_transient());
        assert_eq!(engine.stats().failures, 1);
    }
}

//! Rate-limited HTTP fetching with retries.
//!
//! One [`RateLimitedFetcher`] is shared by every worker, so the governor
//! quota is a global floor on inter-request spacing no matter how many
//! workers dispatch concurrently. Transient failures (timeouts, resets,
//! 429 and 5xx) are retried with exponential backoff; other 4xx are
//! permanent immediately.

use crate::error::{FetchError, FetchErrorKind};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// User-Agent pool, rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

const BASE_BACKOFF_MS: u64 = 500;

/// A fetched page: final URL after redirects, status and body.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// The fetch capability the orchestrator and discoverer depend on.
/// Integration tests substitute their own implementations.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageContent, FetchError>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP fetcher enforcing a global minimum inter-request delay.
pub struct RateLimitedFetcher {
    client: reqwest::Client,
    limiter: Option<Arc<DirectLimiter>>,
    max_retries: u32,
    timeout_secs: u64,
}

impl RateLimitedFetcher {
    pub fn new(delay: Duration, timeout: Duration, max_retries: u32) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        // A zero delay disables the limiter outright (useful in tests).
        let limiter = Quota::with_period(delay)
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        Ok(Self {
            client,
            limiter,
            max_retries: max_retries.max(1),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers
    }

    fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
    }

    async fn backoff(attempt: u32) {
        let delay = BASE_BACKOFF_MS * 2_u64.pow(attempt.saturating_sub(1));
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    async fn fetch_once(&self, url: &str) -> Result<PageContent, FetchError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let response = self
            .client
            .get(url)
            .headers(Self::headers())
            .header(USER_AGENT, Self::random_user_agent())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout_secs)
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(PageContent {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for RateLimitedFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent, FetchError> {
        let mut last_status = None;

        for attempt in 1..=self.max_retries {
            match self.fetch_once(url).await {
                Ok(page) => {
                    debug!(url, status = page.status, attempt, "fetched");
                    return Ok(page);
                }
                Err(e) if e.kind() == FetchErrorKind::Transient => {
                    last_status = e.status().or(last_status);
                    warn!(url, attempt, error = %e, "transient fetch failure, backing off");
                    if attempt < self.max_retries {
                        Self::backoff(attempt).await;
                    }
                }
                Err(e) => {
                    debug!(url, error = %e, "permanent fetch failure");
                    return Err(e);
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts: self.max_retries,
            last_status,
        })
    }
}

//! HTTP client for supplier crawling with rate limiting and retries
//!
//! Wraps `reqwest` with a token-bucket rate limiter, the shared retry
//! policy, and transparent decompression of `.gz`-served payloads (sitemap
//! shards are frequently shipped that way). Concurrency bounding is the
//! caller's responsibility; pacing is enforced here.

use crate::infrastructure::config::AppConfig;
use crate::infrastructure::retry::{run_with_retry, RetryPolicy};
use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::io::Read;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

static ROBOTS_DISALLOW_ALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*Disallow:\s*/\s*$").expect("robots pattern"));

/// Rate-limited, retrying HTTP client shared by every pipeline stage.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(&config.user_agent)
            .gzip(true)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("rate limit must be > 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_backoff_ms),
            ),
        })
    }

    /// Fetch a URL as text, retrying transient failures with exponential
    /// backoff. Exhaustion yields a terminal error carrying the URL.
    /// `.gz`-suffixed or gzip-typed payloads are decompressed before return.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        run_with_retry(&self.retry, url, || self.fetch_text_once(url))
            .await
            .with_context(|| format!("fetch failed after retries: {url}"))
    }

    /// Fetch a URL as raw bytes (image payloads), with the same retry rules.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        run_with_retry(&self.retry, url, || self.fetch_bytes_once(url))
            .await
            .with_context(|| format!("download failed after retries: {url}"))
    }

    async fn fetch_text_once(&self, url: &str) -> Result<String> {
        self.rate_limiter.until_ready().await;
        debug!("fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request failed: {url}"))?;

        if !response.status().is_success() {
            bail!("HTTP {} for {}", response.status().as_u16(), url);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let gzipped = url.ends_with(".gz") || content_type.contains("gzip");

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body: {url}"))?;

        if gzipped {
            let mut decoder = GzDecoder::new(&bytes[..]);
            let mut out = String::new();
            decoder
                .read_to_string(&mut out)
                .with_context(|| format!("failed to gunzip payload: {url}"))?;
            Ok(out)
        } else {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    async fn fetch_bytes_once(&self, url: &str) -> Result<Vec<u8>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request failed: {url}"))?;

        if !response.status().is_success() {
            bail!("HTTP {} for {}", response.status().as_u16(), url);
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body: {url}"))?;
        Ok(bytes.to_vec())
    }

    /// Whether robots.txt permits crawling the site at all. A blanket
    /// `Disallow: /` blocks the run; an unreachable robots.txt is treated as
    /// permission, matching the usual crawler convention.
    pub async fn robots_allows(&self, base_url: &str) -> bool {
        let robots_url = format!("{}/robots.txt", base_url.trim_end_matches('/'));
        match self.fetch_text(&robots_url).await {
            Ok(body) => !ROBOTS_DISALLOW_ALL.is_match(&body),
            Err(_) => {
                warn!("robots.txt not reachable at {}, assuming allowed", robots_url);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_default_config() {
        let config = AppConfig::default();
        assert!(HttpClient::from_config(&config).is_ok());
    }

    #[test]
    fn robots_pattern_matches_blanket_disallow_only() {
        assert!(ROBOTS_DISALLOW_ALL.is_match("User-agent: *\nDisallow: /\n"));
        assert!(!ROBOTS_DISALLOW_ALL.is_match("User-agent: *\nDisallow: /admin/\n"));
        assert!(!ROBOTS_DISALLOW_ALL.is_match("User-agent: *\nAllow: /\n"));
    }
}

//! HTTP client for the upstream download-link page.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{header, Client};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::BROWSER_USER_AGENTS;

/// Why an upstream fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout")]
    Timeout,
    #[error("Cannot connect to upstream service: {0}")]
    Unreachable(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("failed to read upstream response: {0}")]
    Body(String),
}

impl FetchError {
    /// Short machine-readable code included in error responses.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Timeout => "TIMEOUT".to_string(),
            Self::Unreachable(_) => "UNREACHABLE".to_string(),
            Self::Status(status) => format!("HTTP_{status}"),
            Self::Body(_) => "BAD_BODY".to_string(),
        }
    }

    /// Human-readable reason shown to API clients.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Status(404) => "Tweet not found or upstream service unavailable".to_string(),
            Self::Status(403) => "Access denied by upstream service".to_string(),
            Self::Status(429) => "Rate limited by upstream service. Please try again later.".to_string(),
            Self::Unreachable(_) => "Cannot connect to upstream service".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else if err.is_connect() || err.is_request() {
            Self::Unreachable(err.to_string())
        } else {
            Self::Body(err.to_string())
        }
    }
}

/// Client for the upstream `/info?url=` page.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
}

impl UpstreamClient {
    /// Create a client against `base_url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL download links are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the upstream page URL for a tweet URL.
    #[must_use]
    pub fn info_url(&self, source_url: &str) -> String {
        format!("{}/info?url={}", self.base_url, urlencoding::encode(source_url))
    }

    /// Fetch the upstream HTML page for a tweet URL.
    ///
    /// Makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on timeout, connection failure or a non-2xx status.
    pub async fn fetch_info(&self, source_url: &str) -> Result<String, FetchError> {
        let info_url = self.info_url(source_url);
        debug!(url = %info_url, "Fetching upstream page");

        let response = self
            .client
            .get(&info_url)
            .header(header::USER_AGENT, random_user_agent())
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .header("sec-fetch-dest", "document")
            .header("sec-fetch-mode", "navigate")
            .header("sec-fetch-site", "none")
            .header(header::UPGRADE_INSECURE_REQUESTS, "1")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %info_url, status = status.as_u16(), "Upstream returned error status");
            return Err(FetchError::Status(status.as_u16()));
        }

        response.text().await.map_err(FetchError::from)
    }
}

fn random_user_agent() -> &'static str {
    BROWSER_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(BROWSER_USER_AGENTS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_url_encodes_source() {
        let client = UpstreamClient::new("https://twitsave.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.info_url("https://x.com/user/status/123?s=20"),
            "https://twitsave.com/info?url=https%3A%2F%2Fx.com%2Fuser%2Fstatus%2F123%3Fs%3D20"
        );
    }

    #[test]
    fn test_random_user_agent_is_from_pool() {
        for _ in 0..20 {
            assert!(BROWSER_USER_AGENTS.contains(&random_user_agent()));
        }
    }

    #[test]
    fn test_fetch_error_codes() {
        assert_eq!(FetchError::Timeout.code(), "TIMEOUT");
        assert_eq!(FetchError::Status(429).code(), "HTTP_429");
        assert!(FetchError::Status(429).reason().contains("Rate limited"));
        assert_eq!(FetchError::Status(500).reason(), "upstream returned HTTP 500");
    }
}

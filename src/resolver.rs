//! Tweet identifier resolution.

use regex::Regex;

/// Pattern to extract tweet ID from URL.
static TWEET_ID_PATTERN: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"status/(\d+)").unwrap());

/// Why a source URL was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceUrlError {
    Missing,
    Malformed,
    UnsupportedHost,
}

impl SourceUrlError {
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Missing => "Twitter URL is required",
            Self::Malformed => "Invalid Twitter URL",
            Self::UnsupportedHost => "Invalid Twitter URL. Must be from twitter.com or x.com",
        }
    }
}

/// Extract the tweet ID from a status URL.
///
/// Returns the first run of digits after `status/`, or `None` when the URL
/// has no status segment.
#[must_use]
pub fn extract_tweet_id(url: &str) -> Option<String> {
    TWEET_ID_PATTERN
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Check that a user supplied URL is an absolute twitter.com or x.com URL.
///
/// # Errors
///
/// Returns the reason the URL cannot be resolved.
pub fn validate_source_url(url: &str) -> Result<(), SourceUrlError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SourceUrlError::Missing);
    }

    let parsed = url::Url::parse(url).map_err(|_| SourceUrlError::Malformed)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SourceUrlError::Malformed);
    }

    if !url.contains("twitter.com/") && !url.contains("x.com/") {
        return Err(SourceUrlError::UnsupportedHost);
    }

    Ok(())
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tweet whose download links were resolved at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    pub id: i64,
    pub tweet_id: String,
    pub author: String,
    pub tweet_text: String,
    pub tweet_date: String,
    pub thumbnail_url: Option<String>,
    pub total_downloads: i64,
    pub first_fetched: DateTime<Utc>,
    pub last_fetched: DateTime<Utc>,
}

/// Data for the first sighting of a tweet.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub tweet_id: String,
    pub author: String,
    pub tweet_text: String,
    pub tweet_date: String,
    pub thumbnail_url: Option<String>,
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Whether this call created the row.
    pub created: bool,
    /// Counter value after this call.
    pub total_downloads: i64,
}

/// A rendition of a stored video, one row per tweet and download URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DownloadLink {
    pub id: i64,
    pub tweet_id: String,
    pub download_url: String,
    pub quality: String,
    pub resolution: String,
    pub format: String,
    pub source: String,
    /// How many resolutions have returned this link.
    pub fetch_count: i64,
}

/// A rendition seen in one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDownloadLink {
    pub download_url: String,
    pub quality: String,
    pub resolution: String,
    pub format: String,
    pub source: String,
}

/// Coarse client device classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "Desktop",
            Self::Mobile => "Mobile",
            Self::Tablet => "Tablet",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Desktop" => Some(Self::Desktop),
            "Mobile" => Some(Self::Mobile),
            "Tablet" => Some(Self::Tablet),
            _ => None,
        }
    }
}

/// One logged API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RequestRecord {
    pub id: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: String,
    pub browser: String,
    pub platform: String,
    pub twitter_url: String,
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestRecord {
    #[must_use]
    pub fn device_enum(&self) -> Option<DeviceClass> {
        DeviceClass::from_str(&self.device_type)
    }
}

/// Data for logging a new API call.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: DeviceClass,
    pub browser: String,
    pub platform: String,
    pub twitter_url: String,
    pub endpoint: String,
}

/// Lifetime counters, zeroed only by admin resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Counters {
    pub total_requests: i64,
    pub total_videos: i64,
}

/// A free-text operational log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogLine {
    pub id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl LogLine {
    /// Render as `[timestamp] message`.
    #[must_use]
    pub fn render(&self) -> String {
        format!("[{}] {}", self.created_at.to_rfc3339(), self.message)
    }
}

/// What an admin purge removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeTarget {
    /// Zero both lifetime counters.
    Counters,
    /// Delete every request record.
    Requests,
    /// Delete every video and its download links, and zero the video counter.
    Videos,
}

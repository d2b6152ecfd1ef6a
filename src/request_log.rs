//! Per-request client classification and best-effort request logging.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use tracing::warn;

use crate::db::{DeviceClass, NewRequest, Store};

/// Browser substrings, first match wins.
const BROWSERS: &[(&str, &str)] = &[
    ("Chrome", "Chrome"),
    ("Firefox", "Firefox"),
    ("Safari", "Safari"),
    ("Edge", "Edge"),
];

/// Platform substrings, first match wins.
const PLATFORMS: &[(&str, &str)] = &[
    ("Windows", "Windows"),
    ("Mac", "Mac"),
    ("Linux", "Linux"),
    ("Android", "Android"),
    ("iPhone", "iOS"),
];

/// Who made a request, as far as the headers tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
    pub device: DeviceClass,
    pub browser: &'static str,
    pub platform: &'static str,
}

impl ClientInfo {
    /// Build from request headers and the socket peer, if known.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let user_agent = headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string();

        Self {
            ip: client_ip(headers, peer),
            device: classify_device(&user_agent),
            browser: first_match(&user_agent, BROWSERS),
            platform: first_match(&user_agent, PLATFORMS),
            user_agent,
        }
    }
}

/// Origin address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    // Check X-Forwarded-For header (if behind proxy)
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return first_ip.to_string();
    }

    // Check X-Real-IP header
    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return real_ip.to_string();
    }

    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

#[must_use]
pub fn classify_device(user_agent: &str) -> DeviceClass {
    if user_agent.contains("Mobile") {
        DeviceClass::Mobile
    } else if user_agent.contains("Tablet") {
        DeviceClass::Tablet
    } else {
        DeviceClass::Desktop
    }
}

fn first_match(user_agent: &str, table: &[(&str, &'static str)]) -> &'static str {
    table
        .iter()
        .find(|(needle, _)| user_agent.contains(needle))
        .map_or("Unknown", |(_, label)| label)
}

/// Result of a best-effort log write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Recorded,
    /// The store rejected the write; the request carries on regardless.
    Dropped(String),
}

impl LogOutcome {
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded)
    }
}

/// Record one API call. Never fails the caller.
pub async fn record(
    store: &dyn Store,
    client: &ClientInfo,
    target_url: &str,
    endpoint: &str,
) -> LogOutcome {
    let request = NewRequest {
        ip_address: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        device_type: client.device,
        browser: client.browser.to_string(),
        platform: client.platform.to_string(),
        twitter_url: target_url.to_string(),
        endpoint: endpoint.to_string(),
    };

    match store.insert_request(&request).await {
        Ok(()) => LogOutcome::Recorded,
        Err(e) => {
            warn!(endpoint, ip = %client.ip, error = %e, "Failed to log request");
            LogOutcome::Dropped(e.to_string())
        }
    }
}

/// Write an operational log line, swallowing failures.
pub async fn note(store: &dyn Store, message: &str) -> LogOutcome {
    match store.append_log(message).await {
        Ok(()) => LogOutcome::Recorded,
        Err(e) => {
            warn!(error = %e, "Failed to write operational log line");
            LogOutcome::Dropped(e.to_string())
        }
    }
}

//! Shared constants used across the application.

/// Name reported by `/health` and `/api`.
pub const SERVICE_NAME: &str = "Twitter Video Download API";

/// Version reported in download responses.
pub const API_VERSION: &str = "2.0";

/// Default upstream page that renders download links for a tweet.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://twitsave.com";

/// Source label attached to every download candidate.
pub const CANDIDATE_SOURCE: &str = "twitsave";

/// Realistic browser user agents, one is picked at random per upstream request.
///
/// These are indistinguishable from real browser traffic so the upstream
/// serves the same page a visitor would see.
pub const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Number of rows returned by `/api/requests/recent`.
pub const RECENT_REQUESTS_LIMIT: usize = 50;

/// Newest request records included in `/api/admin/data`.
pub const ADMIN_REQUEST_LIMIT: usize = 1000;

/// Number of lines returned by `/api/admin/logs`.
pub const ADMIN_LOG_LIMIT: usize = 150;

/// Operational log lines kept by the in-memory backend.
pub const MEMORY_LOG_RETENTION: usize = 500;

/// Upstream latency samples averaged by the monitor.
pub const MONITOR_LATENCY_SAMPLES: usize = 1000;

/// Errors kept by the monitor.
pub const MONITOR_ERROR_RETENTION: usize = 50;

/// Errors shown on `/health`.
pub const MONITOR_ERRORS_SHOWN: usize = 10;

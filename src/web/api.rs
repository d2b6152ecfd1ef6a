use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::rejection::QueryRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::AppState;
use crate::constants::{API_VERSION, RECENT_REQUESTS_LIMIT, SERVICE_NAME};
use crate::db::{NewDownloadLink, NewVideo};
use crate::extractor::{self, DownloadCandidate, TweetInfo};
use crate::request_log::{self, ClientInfo};
use crate::resolver::{extract_tweet_id, validate_source_url};
use crate::stats::compute_stats;

const DOWNLOAD_ENDPOINT: &str = "/api/download";

#[derive(Debug, Deserialize)]
pub(super) struct DownloadParams {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResponse {
    success: bool,
    twitter_url: String,
    tweet_id: String,
    tweet_info: TweetInfo,
    download_links: Vec<DownloadCandidate>,
    total_videos_found: usize,
    thumbnail: Option<String>,
    video_preview: Option<String>,
    api_version: &'static str,
    database: &'static str,
}

pub(super) async fn download(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let client = ClientInfo::from_headers(&headers, peer.map(|ConnectInfo(addr)| addr));

    match resolve_download(&state, &client, params.url.as_deref().unwrap_or_default()).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn resolve_download(
    state: &AppState,
    client: &ClientInfo,
    source_url: &str,
) -> Result<DownloadResponse, ApiError> {
    let source_url = source_url.trim();
    validate_source_url(source_url)?;

    let tweet_id = extract_tweet_id(source_url)
        .ok_or_else(|| ApiError::InvalidInput("Could not extract tweet ID from URL".to_string()))?;

    request_log::record(state.store.as_ref(), client, source_url, DOWNLOAD_ENDPOINT).await;

    debug!(tweet_id = %tweet_id, url = %source_url, "Fetching upstream page");
    let fetch_started = Instant::now();
    let fetched = state.upstream.fetch_info(source_url).await;
    state.monitor.track_latency(fetch_started.elapsed());

    let html = match fetched {
        Ok(html) => html,
        Err(e) => {
            warn!(tweet_id = %tweet_id, error = %e, "Upstream fetch failed");
            let message = format!("Upstream fetch failed for tweet {tweet_id}: {e}");
            state.monitor.log_error(message.as_str());
            request_log::note(state.store.as_ref(), &message).await;
            return Err(ApiError::Upstream(e));
        }
    };

    let extraction = extractor::extract(&html, source_url, state.upstream.base_url());
    if !extraction.has_downloads() {
        info!(tweet_id = %tweet_id, "No download links found");
        return Err(ApiError::NotFound("No download links found".to_string()));
    }

    let outcome = state
        .store
        .upsert_video(&NewVideo {
            tweet_id: tweet_id.clone(),
            author: extraction.tweet_info.author.clone(),
            tweet_text: extraction.tweet_info.text.clone(),
            tweet_date: extraction.tweet_info.date.clone(),
            thumbnail_url: extraction.thumbnail.clone(),
        })
        .await
        .map_err(|e| {
            state.monitor.log_error(format!("Failed to store video {tweet_id}: {e:#}"));
            ApiError::internal("Failed to store video", &e)
        })?;

    let links: Vec<NewDownloadLink> = extraction.download_links.iter().map(Into::into).collect();
    if let Err(e) = state.store.record_download_links(&tweet_id, &links).await {
        warn!(tweet_id = %tweet_id, error = %e, "Failed to store download links");
    }

    if outcome.created {
        info!(tweet_id = %tweet_id, "New video stored");
        request_log::note(state.store.as_ref(), &format!("New video stored: {tweet_id}")).await;
    } else {
        debug!(
            tweet_id = %tweet_id,
            total_downloads = outcome.total_downloads,
            "Video download count updated"
        );
    }

    Ok(DownloadResponse {
        success: true,
        twitter_url: source_url.to_string(),
        tweet_id,
        total_videos_found: extraction.download_links.len(),
        tweet_info: extraction.tweet_info,
        download_links: extraction.download_links,
        thumbnail: extraction.thumbnail,
        video_preview: extraction.video_preview,
        api_version: API_VERSION,
        database: state.store.backend().as_str(),
    })
}

pub(super) async fn stats(State(state): State<AppState>) -> Response {
    match compute_stats(state.store.as_ref(), state.config.popular_limit).await {
        Ok(summary) => Json(json!({
            "success": true,
            "statistics": summary,
            "database": state.store.backend().as_str(),
        }))
        .into_response(),
        Err(e) => ApiError::internal("Failed to fetch statistics", &e).into_response(),
    }
}

pub(super) async fn recent_requests(State(state): State<AppState>) -> Response {
    match state.store.list_recent_requests(RECENT_REQUESTS_LIMIT).await {
        Ok(requests) => Json(json!({
            "success": true,
            "total": requests.len(),
            "recentRequests": requests,
            "database": state.store.backend().as_str(),
        }))
        .into_response(),
        Err(e) => ApiError::internal("Failed to fetch recent requests", &e).into_response(),
    }
}

pub(super) async fn health(State(state): State<AppState>) -> Response {
    let backend = state.store.backend().as_str();
    let uptime = format_uptime(state.started_at.elapsed());
    let timestamp = chrono::Utc::now().to_rfc3339();
    let monitor = state.monitor.snapshot();

    match state.store.count_requests().await {
        Ok(total_requests) => Json(json!({
            "status": "OK",
            "timestamp": timestamp,
            "uptime": uptime,
            "service": SERVICE_NAME,
            "database": {
                "type": backend,
                "connected": true,
                "totalRequests": total_requests,
            },
            "monitor": monitor,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "ERROR",
                    "timestamp": timestamp,
                    "uptime": uptime,
                    "service": SERVICE_NAME,
                    "database": {
                        "type": backend,
                        "connected": false,
                        "error": e.to_string(),
                    },
                    "monitor": monitor,
                })),
            )
                .into_response()
        }
    }
}

pub(super) async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": API_VERSION,
        "description": "Resolve downloadable video links for Twitter/X posts",
        "database": state.store.backend().as_str(),
        "endpoints": {
            "/api/download": "Get download links for Twitter video",
            "/api/stats": "Get API usage statistics",
            "/api/requests/recent": "Get recent API requests",
            "/health": "Service health check",
        },
    }))
}

pub(super) async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Endpoint not found" })),
    )
        .into_response()
}

/// Render a duration as `1d 2h 3m 4s`, dropping leading zero units.
#[must_use]
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) =
        (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60);

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

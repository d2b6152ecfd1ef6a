//! Admin endpoints behind a shared bearer secret.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::{async_trait, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::error::ApiError;
use super::AppState;
use crate::config::Config;
use crate::constants::{ADMIN_LOG_LIMIT, ADMIN_REQUEST_LIMIT};
use crate::db::{LogLine, PurgeTarget};
use crate::request_log;

/// Exact match of the presented bearer token against the configured secret.
///
/// With no configured secret nothing is authorized.
#[must_use]
pub fn authorize(configured: Option<&str>, presented: Option<&str>) -> bool {
    match (configured, presented) {
        (Some(expected), Some(token)) => !expected.is_empty() && expected == token,
        _ => false,
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Rejects the request with 401 unless it carries the admin secret.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Arc<Config>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<Config>::from_ref(state);

        if authorize(config.admin_key.as_deref(), bearer_token(parts)) {
            Ok(RequireAdmin)
        } else {
            warn!(path = %parts.uri.path(), "Rejected admin request");
            Err(ApiError::Unauthorized)
        }
    }
}

pub(super) async fn data(_: RequireAdmin, State(state): State<AppState>) -> Response {
    let counters = match state.store.counters().await {
        Ok(c) => c,
        Err(e) => return ApiError::internal("Failed to fetch counters", &e).into_response(),
    };
    let videos = match state.store.list_videos().await {
        Ok(v) => v,
        Err(e) => return ApiError::internal("Failed to fetch videos", &e).into_response(),
    };
    let requests = match state.store.list_recent_requests(ADMIN_REQUEST_LIMIT).await {
        Ok(r) => r,
        Err(e) => return ApiError::internal("Failed to fetch requests", &e).into_response(),
    };
    let download_links = match state.store.list_download_links().await {
        Ok(l) => l,
        Err(e) => return ApiError::internal("Failed to fetch download links", &e).into_response(),
    };

    Json(json!({
        "success": true,
        "stats": counters,
        "videos": videos,
        "downloadLinks": download_links,
        "requests": requests,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub(super) struct BanRequest {
    ip: Option<String>,
}

pub(super) async fn ban(
    _: RequireAdmin,
    State(state): State<AppState>,
    body: Result<Json<BanRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let Some(ip) = body.ip.map(|ip| ip.trim().to_string()).filter(|ip| !ip.is_empty()) else {
        return ApiError::InvalidInput("IP required".to_string()).into_response();
    };

    if let Err(e) = state.store.ban(&ip).await {
        return ApiError::internal("Failed to ban address", &e).into_response();
    }

    info!(ip = %ip, "Address banned");
    request_log::note(state.store.as_ref(), &format!("Banned IP {ip}")).await;

    Json(json!({ "success": true, "ip": ip })).into_response()
}

async fn purge(state: &AppState, target: PurgeTarget, message: &str) -> Response {
    if let Err(e) = state.store.purge(target).await {
        return ApiError::internal(&format!("Failed to purge {target:?}"), &e).into_response();
    }

    info!(purge = ?target, "{message}");
    request_log::note(state.store.as_ref(), message).await;

    Json(json!({ "success": true })).into_response()
}

pub(super) async fn reset_stats(_: RequireAdmin, State(state): State<AppState>) -> Response {
    purge(&state, PurgeTarget::Counters, "Statistics reset").await
}

pub(super) async fn clear_requests(_: RequireAdmin, State(state): State<AppState>) -> Response {
    purge(&state, PurgeTarget::Requests, "Request log cleared").await
}

pub(super) async fn clear_videos(_: RequireAdmin, State(state): State<AppState>) -> Response {
    purge(&state, PurgeTarget::Videos, "Videos cleared").await
}

pub(super) async fn logs(_: RequireAdmin, State(state): State<AppState>) -> Response {
    match state.store.recent_logs(ADMIN_LOG_LIMIT).await {
        Ok(lines) => {
            let logs: Vec<String> = lines.iter().map(LogLine::render).collect();
            Json(json!({ "success": true, "logs": logs })).into_response()
        }
        Err(e) => ApiError::internal("Failed to fetch logs", &e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_exact_match() {
        assert!(authorize(Some("secret"), Some("secret")));
        assert!(!authorize(Some("secret"), Some("Secret")));
        assert!(!authorize(Some("secret"), Some("secret2")));
        assert!(!authorize(Some("secret"), None));
    }

    #[test]
    fn test_authorize_without_configured_secret() {
        assert!(!authorize(None, Some("anything")));
        assert!(!authorize(None, None));
        assert!(!authorize(Some(""), Some("")));
    }
}

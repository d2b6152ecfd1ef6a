mod admin;
mod api;
mod error;

pub use admin::{authorize, RequireAdmin};
pub use api::format_uptime;
pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, FromRef, Request, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::monitor::Monitor;
use crate::request_log::client_ip;
use crate::upstream::UpstreamClient;

/// Shared application state.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub upstream: UpstreamClient,
    pub config: Arc<Config>,
    pub monitor: Arc<Monitor>,
    pub started_at: Instant,
}

impl AppState {
    /// Build state from a config and an opened store.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream_base_url, config.fetch_timeout)
            .context("Failed to initialize upstream client")?;

        Ok(Self {
            store,
            upstream,
            config: Arc::new(config),
            monitor: Arc::new(Monitor::new()),
            started_at: Instant::now(),
        })
    }
}

/// Start the web server and run until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn serve<F>(config: Config, store: Arc<dyn Store>, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.web_host, config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = create_app(AppState::new(config, store)?);

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Web server error")?;

    Ok(())
}

/// Create the main application router.
pub fn create_app(state: AppState) -> Router {
    let router = Router::new()
        .route("/api", get(api::index))
        .route("/api/download", get(api::download))
        .route("/api/stats", get(api::stats))
        .route("/api/requests/recent", get(api::recent_requests))
        .route("/health", get(api::health))
        .route("/api/admin/data", get(admin::data))
        .route("/api/admin/ban", post(admin::ban))
        .route("/api/admin/reset-stats", post(admin::reset_stats))
        .route("/api/admin/clear-requests", post(admin::clear_requests))
        .route("/api/admin/clear-videos", post(admin::clear_videos))
        .route("/api/admin/logs", get(admin::logs));

    let static_dir = &state.config.static_dir;
    let router = if static_dir.is_dir() {
        info!(static_dir = %static_dir.display(), "Serving static files");
        router.fallback_service(ServeDir::new(static_dir).fallback(api::not_found.into_service()))
    } else {
        router.fallback(api::not_found)
    };

    // Layers run outside-in: the ban guard sees every request first
    router
        .layer(middleware::from_fn_with_state(state.clone(), count_request))
        .layer(middleware::from_fn_with_state(state.clone(), ban_guard))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ban_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    match state.store.is_banned(&ip).await {
        Ok(true) => {
            info!(ip = %ip, path = %request.uri().path(), "Rejected banned address");
            return ApiError::Banned.into_response();
        }
        Ok(false) => {}
        Err(e) => warn!(ip = %ip, error = %e, "Ban check failed, letting request through"),
    }

    next.run(request).await
}

/// Bumps the lifetime counter for every request except rejected admin calls.
async fn count_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.monitor.track_request();
    let response = next.run(request).await;

    if response.status() != StatusCode::UNAUTHORIZED {
        if let Err(e) = state.store.increment_requests().await {
            warn!(error = %e, "Failed to bump request counter");
        }
    }
    response
}

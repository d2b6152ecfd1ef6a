mod memory;
mod migrations;
mod models;
mod postgres;
mod sqlite;
mod supabase;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{Config, StorageBackend};

/// Persistence interface shared by every backend.
///
/// The web layer only ever sees `Arc<dyn Store>`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Which backend this is.
    fn backend(&self) -> StorageBackend;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Create the video on first sight, otherwise bump its counter and
    /// `last_fetched`. Existing metadata is never overwritten.
    ///
    /// Must not lose increments under concurrent calls for one tweet.
    async fn upsert_video(&self, video: &NewVideo) -> Result<UpsertOutcome>;

    /// Store the renditions returned for `tweet_id`. Unknown links start
    /// with a fetch count of one, known ones are bumped.
    async fn record_download_links(
        &self,
        tweet_id: &str,
        links: &[NewDownloadLink],
    ) -> Result<()>;

    /// Every stored rendition in insertion order.
    async fn list_download_links(&self) -> Result<Vec<DownloadLink>>;

    /// Append a request record.
    async fn insert_request(&self, request: &NewRequest) -> Result<()>;

    /// Videos by `total_downloads` descending, ties in insertion order.
    async fn list_top_videos(&self, limit: usize) -> Result<Vec<Video>>;

    /// All videos in insertion order.
    async fn list_videos(&self) -> Result<Vec<Video>>;

    /// Newest request records first.
    async fn list_recent_requests(&self, limit: usize) -> Result<Vec<RequestRecord>>;

    async fn count_requests(&self) -> Result<i64>;

    async fn count_videos(&self) -> Result<i64>;

    /// Request counts per `device_type`.
    async fn device_histogram(&self) -> Result<Vec<(String, i64)>>;

    async fn counters(&self) -> Result<Counters>;

    /// Bump the lifetime request counter.
    async fn increment_requests(&self) -> Result<()>;

    /// Deny all further requests from `address`. Banning twice is a no-op.
    async fn ban(&self, address: &str) -> Result<()>;

    async fn is_banned(&self, address: &str) -> Result<bool>;

    async fn purge(&self, target: PurgeTarget) -> Result<()>;

    /// Record an operational log line.
    async fn append_log(&self, message: &str) -> Result<()>;

    /// Newest log lines first.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<LogLine>>;
}

/// Open the backend selected by the configuration.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached or migrated.
pub async fn open(config: &Config) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.storage_backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage: all statistics and bans are lost on restart");
            Arc::new(MemoryStore::new(config.request_log_retention))
        }
        StorageBackend::Sqlite => {
            if let Some(parent) = config.database_path.parent() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
            Arc::new(SqliteStore::new(&config.database_path).await?)
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            Arc::new(PostgresStore::connect(url).await?)
        }
        StorageBackend::Supabase => {
            let url = config
                .supabase_url
                .as_deref()
                .context("SUPABASE_URL is required for the supabase backend")?;
            let key = config
                .supabase_key
                .as_deref()
                .context("SUPABASE_KEY is required for the supabase backend")?;
            Arc::new(SupabaseStore::new(url, key)?)
        }
    };

    store
        .ping()
        .await
        .with_context(|| format!("{} backend is not reachable", store.backend().as_str()))?;

    info!(backend = store.backend().as_str(), "Storage initialized");
    Ok(store)
}

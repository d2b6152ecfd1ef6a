use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::migrations;
use super::models::{
    Counters, DownloadLink, LogLine, NewDownloadLink, NewRequest, NewVideo, PurgeTarget,
    RequestRecord, UpsertOutcome, Video,
};
use super::Store;
use crate::config::StorageBackend;

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Concurrent upserts for one tweet serialize on the write lock
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.verify_writable(path).await?;
        migrations::run(&store.pool).await?;
        info!(path = %path.display(), "SQLite migrations complete");

        Ok(store)
    }

    async fn verify_writable(&self, path: &Path) -> Result<()> {
        // Starting a transaction requires write capability on SQLite; surface
        // a read-only volume here instead of on the first request.
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "SQLite database is not writable (path: {}). Check volume mount permissions/ownership",
                path.display()
            )
        })?;

        tx.commit()
            .await
            .context("Failed to commit SQLite writability check")?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Sqlite
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Failed to ping SQLite")?;
        Ok(())
    }

    async fn upsert_video(&self, video: &NewVideo) -> Result<UpsertOutcome> {
        let now = Utc::now();
        let (total_downloads,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO videos (tweet_id, author, tweet_text, tweet_date, thumbnail_url,
                                total_downloads, first_fetched, last_fetched)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(tweet_id) DO UPDATE SET
                total_downloads = total_downloads + 1,
                last_fetched = excluded.last_fetched
            RETURNING total_downloads
            ",
        )
        .bind(&video.tweet_id)
        .bind(&video.author)
        .bind(&video.tweet_text)
        .bind(&video.tweet_date)
        .bind(&video.thumbnail_url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert video")?;

        let created = total_downloads == 1;
        if created {
            sqlx::query("UPDATE stats SET total_videos = total_videos + 1 WHERE id = 1")
                .execute(&self.pool)
                .await
                .context("Failed to bump video counter")?;
        }

        Ok(UpsertOutcome {
            created,
            total_downloads,
        })
    }

    async fn record_download_links(
        &self,
        tweet_id: &str,
        links: &[NewDownloadLink],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for link in links {
            sqlx::query(
                r"
                INSERT INTO download_links (tweet_id, download_url, quality, resolution,
                                            format, source, fetch_count)
                VALUES (?, ?, ?, ?, ?, ?, 1)
                ON CONFLICT(tweet_id, download_url) DO UPDATE SET
                    fetch_count = fetch_count + 1
                ",
            )
            .bind(tweet_id)
            .bind(&link.download_url)
            .bind(&link.quality)
            .bind(&link.resolution)
            .bind(&link.format)
            .bind(&link.source)
            .execute(&mut *tx)
            .await
            .context("Failed to record download link")?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_download_links(&self) -> Result<Vec<DownloadLink>> {
        sqlx::query_as("SELECT * FROM download_links ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch download links")
    }

    async fn insert_request(&self, request: &NewRequest) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO requests (ip_address, user_agent, device_type, browser, platform,
                                  twitter_url, endpoint, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&request.ip_address)
        .bind(&request.user_agent)
        .bind(request.device_type.as_str())
        .bind(&request.browser)
        .bind(&request.platform)
        .bind(&request.twitter_url)
        .bind(&request.endpoint)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to insert request")?;

        Ok(())
    }

    async fn list_top_videos(&self, limit: usize) -> Result<Vec<Video>> {
        sqlx::query_as("SELECT * FROM videos ORDER BY total_downloads DESC, id ASC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch top videos")
    }

    async fn list_videos(&self) -> Result<Vec<Video>> {
        sqlx::query_as("SELECT * FROM videos ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch videos")
    }

    async fn list_recent_requests(&self, limit: usize) -> Result<Vec<RequestRecord>> {
        sqlx::query_as("SELECT * FROM requests ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch recent requests")
    }

    async fn count_requests(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count requests")?;
        Ok(count)
    }

    async fn count_videos(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM videos")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count videos")?;
        Ok(count)
    }

    async fn device_histogram(&self) -> Result<Vec<(String, i64)>> {
        sqlx::query_as(
            r"
            SELECT device_type, COUNT(*) as count
            FROM requests
            GROUP BY device_type
            ORDER BY count DESC, device_type ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to count requests by device")
    }

    async fn counters(&self) -> Result<Counters> {
        let counters: Option<Counters> =
            sqlx::query_as("SELECT total_requests, total_videos FROM stats WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch counters")?;
        Ok(counters.unwrap_or_default())
    }

    async fn increment_requests(&self) -> Result<()> {
        sqlx::query("UPDATE stats SET total_requests = total_requests + 1 WHERE id = 1")
            .execute(&self.pool)
            .await
            .context("Failed to bump request counter")?;
        Ok(())
    }

    async fn ban(&self, address: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO bans (ip_address) VALUES (?)")
            .bind(address)
            .execute(&self.pool)
            .await
            .context("Failed to insert ban")?;
        Ok(())
    }

    async fn is_banned(&self, address: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM bans WHERE ip_address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check ban list")?;
        Ok(row.is_some())
    }

    async fn purge(&self, target: PurgeTarget) -> Result<()> {
        match target {
            PurgeTarget::Counters => {
                sqlx::query("UPDATE stats SET total_requests = 0, total_videos = 0 WHERE id = 1")
                    .execute(&self.pool)
                    .await
                    .context("Failed to reset counters")?;
            }
            PurgeTarget::Requests => {
                sqlx::query("DELETE FROM requests")
                    .execute(&self.pool)
                    .await
                    .context("Failed to clear requests")?;
            }
            PurgeTarget::Videos => {
                let mut tx = self.pool.begin().await?;
                sqlx::query("DELETE FROM download_links")
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear download links")?;
                sqlx::query("DELETE FROM videos")
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear videos")?;
                sqlx::query("UPDATE stats SET total_videos = 0 WHERE id = 1")
                    .execute(&mut *tx)
                    .await
                    .context("Failed to reset video counter")?;
                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn append_log(&self, message: &str) -> Result<()> {
        sqlx::query("INSERT INTO logs (message, created_at) VALUES (?, ?)")
            .bind(message)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to insert log line")?;
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<LogLine>> {
        sqlx::query_as("SELECT * FROM logs ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch log lines")
    }
}

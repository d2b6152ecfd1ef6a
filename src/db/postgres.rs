use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::models::{
    Counters, DownloadLink, LogLine, NewDownloadLink, NewRequest, NewVideo, PurgeTarget,
    RequestRecord, UpsertOutcome, Video,
};
use super::Store;
use crate::config::StorageBackend;

/// Schema statements, applied in order on every start.
const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS videos (
        id BIGSERIAL PRIMARY KEY,
        tweet_id TEXT UNIQUE NOT NULL,
        author TEXT NOT NULL DEFAULT '',
        tweet_text TEXT NOT NULL DEFAULT '',
        tweet_date TEXT NOT NULL DEFAULT '',
        thumbnail_url TEXT,
        total_downloads BIGINT NOT NULL DEFAULT 1,
        first_fetched TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_fetched TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS requests (
        id BIGSERIAL PRIMARY KEY,
        ip_address TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        device_type TEXT NOT NULL,
        browser TEXT NOT NULL,
        platform TEXT NOT NULL,
        twitter_url TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_requests_device_type ON requests(device_type)",
    r"
    CREATE TABLE IF NOT EXISTS bans (
        id BIGSERIAL PRIMARY KEY,
        ip_address TEXT UNIQUE NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS stats (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        total_requests BIGINT NOT NULL DEFAULT 0,
        total_videos BIGINT NOT NULL DEFAULT 0
    )
    ",
    "INSERT INTO stats (id, total_requests, total_videos) VALUES (1, 0, 0) ON CONFLICT (id) DO NOTHING",
    r"
    CREATE TABLE IF NOT EXISTS logs (
        id BIGSERIAL PRIMARY KEY,
        message TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS download_links (
        id BIGSERIAL PRIMARY KEY,
        tweet_id TEXT NOT NULL,
        download_url TEXT NOT NULL,
        quality TEXT NOT NULL,
        resolution TEXT NOT NULL,
        format TEXT NOT NULL,
        source TEXT NOT NULL,
        fetch_count BIGINT NOT NULL DEFAULT 1,
        UNIQUE (tweet_id, download_url)
    )
    ",
];

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `url` and create the schema if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .context("Failed to connect to Postgres")?;

        let store = Self { pool };
        store.create_schema().await?;
        info!("Postgres schema ready");
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        for (i, statement) in SCHEMA.iter().enumerate() {
            debug!(step = i, "Applying Postgres schema statement");
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to apply schema statement {i}"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Postgres
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Failed to ping Postgres")?;
        Ok(())
    }

    async fn upsert_video(&self, video: &NewVideo) -> Result<UpsertOutcome> {
        let now = Utc::now();
        // (xmax = 0) is true only for a freshly inserted row
        let (total_downloads, created): (i64, bool) = sqlx::query_as(
            r"
            INSERT INTO videos (tweet_id, author, tweet_text, tweet_date, thumbnail_url,
                                total_downloads, first_fetched, last_fetched)
            VALUES ($1, $2, $3, $4, $5, 1, $6, $6)
            ON CONFLICT (tweet_id) DO UPDATE SET
                total_downloads = videos.total_downloads + 1,
                last_fetched = EXCLUDED.last_fetched
            RETURNING total_downloads, (xmax = 0) AS created
            ",
        )
        .bind(&video.tweet_id)
        .bind(&video.author)
        .bind(&video.tweet_text)
        .bind(&video.tweet_date)
        .bind(&video.thumbnail_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert video")?;

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
                VALUES ($1, $2, $3, $4, $5, $6, 1)
                ON CONFLICT (tweet_id, download_url) DO UPDATE SET
                    fetch_count = download_links.fetch_count + 1
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
        sqlx::query_as("SELECT * FROM videos ORDER BY total_downloads DESC, id ASC LIMIT $1")
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
        sqlx::query_as("SELECT * FROM requests ORDER BY id DESC LIMIT $1")
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
            SELECT device_type, COUNT(*) AS count
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
        sqlx::query("INSERT INTO bans (ip_address) VALUES ($1) ON CONFLICT (ip_address) DO NOTHING")
            .bind(address)
            .execute(&self.pool)
            .await
            .context("Failed to insert ban")?;
        Ok(())
    }

    async fn is_banned(&self, address: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM bans WHERE ip_address = $1")
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
        sqlx::query("INSERT INTO logs (message, created_at) VALUES ($1, $2)")
            .bind(message)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to insert log line")?;
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<LogLine>> {
        sqlx::query_as("SELECT * FROM logs ORDER BY id DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch log lines")
    }
}

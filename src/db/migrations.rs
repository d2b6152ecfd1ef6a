use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    if current_version < 3 {
        debug!("Running migration v3");
        run_migration_v3(pool).await?;
        set_schema_version(pool, 3).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tweet_id TEXT UNIQUE NOT NULL,
            author TEXT NOT NULL DEFAULT '',
            tweet_text TEXT NOT NULL DEFAULT '',
            tweet_date TEXT NOT NULL DEFAULT '',
            thumbnail_url TEXT,
            total_downloads INTEGER NOT NULL DEFAULT 1,
            first_fetched TEXT NOT NULL,
            last_fetched TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create videos table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address TEXT NOT NULL,
            user_agent TEXT NOT NULL,
            device_type TEXT NOT NULL,
            browser TEXT NOT NULL,
            platform TEXT NOT NULL,
            twitter_url TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create requests table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_device_type ON requests(device_type)")
        .execute(pool)
        .await
        .context("Failed to create requests device index")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS bans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create bans table")?;

    // Single-row counters table
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS stats (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            total_requests INTEGER NOT NULL DEFAULT 0,
            total_videos INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create stats table")?;

    sqlx::query("INSERT OR IGNORE INTO stats (id, total_requests, total_videos) VALUES (1, 0, 0)")
        .execute(pool)
        .await
        .context("Failed to seed stats row")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: adding operational logs");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create logs table")?;

    Ok(())
}

async fn run_migration_v3(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v3: adding download links");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS download_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tweet_id TEXT NOT NULL,
            download_url TEXT NOT NULL,
            quality TEXT NOT NULL,
            resolution TEXT NOT NULL,
            format TEXT NOT NULL,
            source TEXT NOT NULL,
            fetch_count INTEGER NOT NULL DEFAULT 1,
            UNIQUE (tweet_id, download_url)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create download_links table")?;

    Ok(())
}

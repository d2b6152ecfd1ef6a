//! Integration tests for the SQLite store.

use std::sync::Arc;

use tempfile::TempDir;
use tweet_video_api::config::StorageBackend;
use tweet_video_api::db::{
    DeviceClass, NewDownloadLink, NewRequest, NewVideo, PurgeTarget, SqliteStore, Store,
};

async fn setup_store() -> (SqliteStore, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let store = SqliteStore::new(&db_path)
        .await
        .expect("Failed to create database");
    (store, temp_dir)
}

fn new_video(tweet_id: &str, author: &str) -> NewVideo {
    NewVideo {
        tweet_id: tweet_id.to_string(),
        author: author.to_string(),
        tweet_text: "clip".to_string(),
        tweet_date: "Jan 1, 2024".to_string(),
        thumbnail_url: Some("https://pbs.twimg.com/thumb.jpg".to_string()),
    }
}

fn new_link(url: &str, quality: &str, resolution: &str) -> NewDownloadLink {
    NewDownloadLink {
        download_url: url.to_string(),
        quality: quality.to_string(),
        resolution: resolution.to_string(),
        format: "mp4".to_string(),
        source: "twitsave".to_string(),
    }
}

fn new_request(ip: &str, device: DeviceClass) -> NewRequest {
    NewRequest {
        ip_address: ip.to_string(),
        user_agent: "test-agent".to_string(),
        device_type: device,
        browser: "Chrome".to_string(),
        platform: "Linux".to_string(),
        twitter_url: "https://x.com/u/status/1".to_string(),
        endpoint: "/api/download".to_string(),
    }
}

#[tokio::test]
async fn test_upsert_creates_then_increments() {
    let (store, _temp_dir) = setup_store().await;
    assert_eq!(store.backend(), StorageBackend::Sqlite);

    let first = store.upsert_video(&new_video("42", "first")).await.unwrap();
    assert!(first.created);
    assert_eq!(first.total_downloads, 1);

    let second = store.upsert_video(&new_video("42", "second")).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.total_downloads, 2);

    let videos = store.list_videos().await.unwrap();
    assert_eq!(videos.len(), 1);
    // Metadata from the first sighting is kept
    assert_eq!(videos[0].author, "first");
    assert!(videos[0].last_fetched >= videos[0].first_fetched);
    assert_eq!(store.counters().await.unwrap().total_videos, 1);
}

#[tokio::test]
async fn test_concurrent_upserts_lose_no_increments() {
    let (store, _temp_dir) = setup_store().await;
    let store = Arc::new(store);
    store.upsert_video(&new_video("7", "a")).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let store = store.clone();
        tasks.spawn(async move { store.upsert_video(&new_video("7", "a")).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let videos = store.list_videos().await.unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].total_downloads, 21);
    assert_eq!(store.counters().await.unwrap().total_videos, 1);
}

#[tokio::test]
async fn test_download_links_inserted_then_bumped() {
    let (store, _temp_dir) = setup_store().await;
    let links = [
        new_link("https://twitsave.com/download?file=aGQ=", "hd", "1280x720"),
        new_link("https://twitsave.com/download?file=c2Q=", "sd", "640x360"),
    ];

    store.upsert_video(&new_video("42", "a")).await.unwrap();
    store.record_download_links("42", &links).await.unwrap();
    store.upsert_video(&new_video("42", "a")).await.unwrap();
    store.record_download_links("42", &links).await.unwrap();
    store.record_download_links("43", &links[..1]).await.unwrap();

    let stored = store.list_download_links().await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].tweet_id, "42");
    assert_eq!(stored[0].quality, "hd");
    assert_eq!(stored[0].resolution, "1280x720");
    assert_eq!(stored[0].format, "mp4");
    assert_eq!(stored[0].fetch_count, 2);
    assert_eq!(stored[1].fetch_count, 2);
    assert_eq!(stored[2].tweet_id, "43");
    assert_eq!(stored[2].fetch_count, 1);

    store.purge(PurgeTarget::Videos).await.unwrap();
    assert!(store.list_download_links().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_top_videos_order() {
    let (store, _temp_dir) = setup_store().await;
    for id in ["1", "2", "3"] {
        store.upsert_video(&new_video(id, id)).await.unwrap();
    }
    store.upsert_video(&new_video("3", "3")).await.unwrap();

    let top = store.list_top_videos(10).await.unwrap();
    let ids: Vec<_> = top.iter().map(|v| v.tweet_id.as_str()).collect();
    assert_eq!(ids, vec!["3", "1", "2"]);

    let limited = store.list_top_videos(1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_requests_and_histogram() {
    let (store, _temp_dir) = setup_store().await;
    store.insert_request(&new_request("1.1.1.1", DeviceClass::Mobile)).await.unwrap();
    store.insert_request(&new_request("2.2.2.2", DeviceClass::Mobile)).await.unwrap();
    store.insert_request(&new_request("3.3.3.3", DeviceClass::Desktop)).await.unwrap();

    assert_eq!(store.count_requests().await.unwrap(), 3);

    let histogram = store.device_histogram().await.unwrap();
    assert_eq!(
        histogram,
        vec![("Mobile".to_string(), 2), ("Desktop".to_string(), 1)]
    );

    let recent = store.list_recent_requests(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].ip_address, "3.3.3.3");
    assert_eq!(recent[0].device_enum(), Some(DeviceClass::Desktop));
}

#[tokio::test]
async fn test_ban_is_idempotent() {
    let (store, _temp_dir) = setup_store().await;
    assert!(!store.is_banned("9.9.9.9").await.unwrap());

    store.ban("9.9.9.9").await.unwrap();
    store.ban("9.9.9.9").await.unwrap();

    assert!(store.is_banned("9.9.9.9").await.unwrap());
    assert!(!store.is_banned("9.9.9.8").await.unwrap());
}

#[tokio::test]
async fn test_purge_targets() {
    let (store, _temp_dir) = setup_store().await;
    store.upsert_video(&new_video("1", "a")).await.unwrap();
    store.insert_request(&new_request("1.1.1.1", DeviceClass::Desktop)).await.unwrap();
    store.increment_requests().await.unwrap();

    store.purge(PurgeTarget::Videos).await.unwrap();
    assert_eq!(store.count_videos().await.unwrap(), 0);
    let counters = store.counters().await.unwrap();
    assert_eq!(counters.total_videos, 0);
    assert_eq!(counters.total_requests, 1);

    store.purge(PurgeTarget::Requests).await.unwrap();
    assert_eq!(store.count_requests().await.unwrap(), 0);

    store.purge(PurgeTarget::Counters).await.unwrap();
    assert_eq!(store.counters().await.unwrap().total_requests, 0);
}

#[tokio::test]
async fn test_logs_newest_first() {
    let (store, _temp_dir) = setup_store().await;
    store.append_log("first").await.unwrap();
    store.append_log("second").await.unwrap();

    let logs = store.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].message, "second");
    assert!(logs[0].render().ends_with("] second"));
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.sqlite");

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        store.upsert_video(&new_video("5", "a")).await.unwrap();
        store.ban("4.4.4.4").await.unwrap();
        store
            .record_download_links("5", &[new_link("https://u/5", "sd", "640x360")])
            .await
            .unwrap();
        store.pool().close().await;
    }

    // Migrations are not re-run destructively
    let store = SqliteStore::new(&db_path).await.unwrap();
    assert_eq!(store.count_videos().await.unwrap(), 1);
    assert!(store.is_banned("4.4.4.4").await.unwrap());
    assert_eq!(store.counters().await.unwrap().total_videos, 1);
    assert_eq!(store.list_download_links().await.unwrap().len(), 1);
}

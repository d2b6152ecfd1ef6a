//! Integration tests for the PostgREST store against a mocked project.

use serde_json::json;
use tweet_video_api::config::StorageBackend;
use tweet_video_api::db::{
    DeviceClass, NewDownloadLink, NewRequest, NewVideo, PurgeTarget, Store, SupabaseStore,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "service-key";

fn store(server: &MockServer) -> SupabaseStore {
    SupabaseStore::new(&server.uri(), KEY).expect("Failed to build store")
}

#[tokio::test]
async fn test_upsert_calls_rpc_with_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/upsert_video"))
        .and(header("apikey", KEY))
        .and(header("authorization", "Bearer service-key"))
        .and(body_json(json!({
            "p_tweet_id": "99",
            "p_author": "someone",
            "p_tweet_text": "clip",
            "p_tweet_date": "",
            "p_thumbnail_url": null,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "total_downloads": 3, "created": false }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store(&server)
        .upsert_video(&NewVideo {
            tweet_id: "99".to_string(),
            author: "someone".to_string(),
            tweet_text: "clip".to_string(),
            tweet_date: String::new(),
            thumbnail_url: None,
        })
        .await
        .unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.total_downloads, 3);
}

#[tokio::test]
async fn test_count_reads_content_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/requests"))
        .and(header("prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-range", "0-0/17")
                .set_body_json(json!([{ "id": 1 }])),
        )
        .mount(&server)
        .await;

    let store = store(&server);
    assert_eq!(store.backend(), StorageBackend::Supabase);
    assert_eq!(store.count_requests().await.unwrap(), 17);
}

#[tokio::test]
async fn test_ban_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bans"))
        .and(query_param("ip_address", "eq.6.6.6.6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "ip_address": "6.6.6.6" }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bans"))
        .and(query_param("ip_address", "eq.1.1.1.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store(&server);
    assert!(store.is_banned("6.6.6.6").await.unwrap());
    assert!(!store.is_banned("1.1.1.1").await.unwrap());
}

#[tokio::test]
async fn test_ban_ignores_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bans"))
        .and(query_param("on_conflict", "ip_address"))
        .and(body_json(json!({ "ip_address": "6.6.6.6" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let store = store(&server);
    store.ban("6.6.6.6").await.unwrap();
    store.ban("6.6.6.6").await.unwrap();
}

#[tokio::test]
async fn test_insert_request_and_histogram() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/requests"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/requests"))
        .and(query_param("select", "device_type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "device_type": "Mobile" },
            { "device_type": "Desktop" },
            { "device_type": "Mobile" },
        ])))
        .mount(&server)
        .await;

    let store = store(&server);
    store
        .insert_request(&NewRequest {
            ip_address: "1.1.1.1".to_string(),
            user_agent: "ua".to_string(),
            device_type: DeviceClass::Mobile,
            browser: "Safari".to_string(),
            platform: "Mac".to_string(),
            twitter_url: "https://x.com/u/status/1".to_string(),
            endpoint: "/api/download".to_string(),
        })
        .await
        .unwrap();

    let histogram = store.device_histogram().await.unwrap();
    assert_eq!(
        histogram,
        vec![("Mobile".to_string(), 2), ("Desktop".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_download_links_go_through_rpc() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/record_download_links"))
        .and(body_json(json!({
            "p_tweet_id": "99",
            "p_links": [{
                "download_url": "https://twitsave.com/download?file=aGQ=",
                "quality": "hd",
                "resolution": "1280x720",
                "format": "mp4",
                "source": "twitsave",
            }],
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/download_links"))
        .and(query_param("order", "id.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 1,
            "tweet_id": "99",
            "download_url": "https://twitsave.com/download?file=aGQ=",
            "quality": "hd",
            "resolution": "1280x720",
            "format": "mp4",
            "source": "twitsave",
            "fetch_count": 3,
        }])))
        .mount(&server)
        .await;

    let store = store(&server);
    store
        .record_download_links(
            "99",
            &[NewDownloadLink {
                download_url: "https://twitsave.com/download?file=aGQ=".to_string(),
                quality: "hd".to_string(),
                resolution: "1280x720".to_string(),
                format: "mp4".to_string(),
                source: "twitsave".to_string(),
            }],
        )
        .await
        .unwrap();

    let links = store.list_download_links().await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].fetch_count, 3);
}

#[tokio::test]
async fn test_clear_videos_resets_video_counter() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/download_links"))
        .and(query_param("id", "gt.0"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/videos"))
        .and(query_param("id", "gt.0"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/stats"))
        .and(query_param("id", "eq.1"))
        .and(body_json(json!({ "total_videos": 0 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store(&server).purge(PurgeTarget::Videos).await.unwrap();
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/increment_stat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("function not found"))
        .mount(&server)
        .await;

    let err = store(&server).increment_requests().await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("HTTP 404"));
    assert!(message.contains("function not found"));
}

//! Hosted backend speaking the PostgREST protocol (Supabase).
//!
//! The project needs the same tables as the Postgres backend plus three
//! functions exposed over RPC:
//!
//! ```sql
//! create or replace function increment_stat(field_name text) returns void
//! language plpgsql as $$
//! begin
//!   execute format('update stats set %I = %I + 1 where id = 1', field_name, field_name);
//! end $$;
//!
//! create or replace function upsert_video(
//!   p_tweet_id text, p_author text, p_tweet_text text, p_tweet_date text, p_thumbnail_url text
//! ) returns table (total_downloads bigint, created boolean)
//! language plpgsql as $$
//! declare
//!   n bigint;
//!   is_new boolean;
//! begin
//!   insert into videos as v (tweet_id, author, tweet_text, tweet_date, thumbnail_url)
//!   values (p_tweet_id, p_author, p_tweet_text, p_tweet_date, p_thumbnail_url)
//!   on conflict (tweet_id) do update
//!     set total_downloads = v.total_downloads + 1, last_fetched = now()
//!   returning v.total_downloads, (v.xmax = 0) into n, is_new;
//!   if is_new then
//!     update stats set total_videos = total_videos + 1 where id = 1;
//!   end if;
//!   return query select n, is_new;
//! end $$;
//!
//! create or replace function record_download_links(p_tweet_id text, p_links jsonb)
//! returns void language sql as $$
//!   insert into download_links as d (tweet_id, download_url, quality, resolution, format, source)
//!   select p_tweet_id, l->>'download_url', l->>'quality', l->>'resolution', l->>'format', l->>'source'
//!   from jsonb_array_elements(p_links) as l
//!   on conflict (tweet_id, download_url) do update set fetch_count = d.fetch_count + 1;
//! $$;
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use super::models::{
    Counters, DownloadLink, LogLine, NewDownloadLink, NewRequest, NewVideo, PurgeTarget,
    RequestRecord, UpsertOutcome, Video,
};
use super::Store;
use crate::config::StorageBackend;

/// PostgREST client for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
}

#[derive(Debug, Deserialize)]
struct UpsertRow {
    total_downloads: i64,
    created: bool,
}

#[derive(Debug, Deserialize)]
struct DeviceRow {
    device_type: String,
}

impl SupabaseStore {
    /// Create a client for the project at `project_url` using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(project_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).context("SUPABASE_KEY is not a valid header value")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .context("SUPABASE_KEY is not a valid header value")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
        })
    }

    fn table(&self, name: &str) -> String {
        format!("{}/{name}", self.rest_url)
    }

    fn rpc(&self, function: &str) -> String {
        format!("{}/rpc/{function}", self.rest_url)
    }

    async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Supabase request failed: {what}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Supabase {what} returned HTTP {}: {body}", status.as_u16());
        }
        Ok(response)
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let request = self
            .client
            .get(self.table(table))
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let response = Self::send(request, &format!("count {table}")).await?;

        let range = response
            .headers()
            .get("content-range")
            .and_then(|h| h.to_str().ok())
            .context("Supabase response is missing Content-Range")?;
        parse_content_range_total(range)
            .with_context(|| format!("Unexpected Content-Range header: {range}"))
    }

    async fn set_counters(&self, body: serde_json::Value) -> Result<()> {
        let request = self
            .client
            .patch(self.table("stats"))
            .query(&[("id", "eq.1")])
            .header("Prefer", "return=minimal")
            .json(&body);
        Self::send(request, "update stats").await?;
        Ok(())
    }
}

/// Total from a PostgREST `Content-Range` header such as `0-0/42` or `*/0`.
fn parse_content_range_total(range: &str) -> Option<i64> {
    range.rsplit('/').next()?.parse().ok()
}

#[async_trait]
impl Store for SupabaseStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Supabase
    }

    async fn ping(&self) -> Result<()> {
        let request = self
            .client
            .get(self.table("stats"))
            .query(&[("select", "id"), ("limit", "1")]);
        Self::send(request, "ping").await?;
        Ok(())
    }

    async fn upsert_video(&self, video: &NewVideo) -> Result<UpsertOutcome> {
        let request = self.client.post(self.rpc("upsert_video")).json(&json!({
            "p_tweet_id": video.tweet_id,
            "p_author": video.author,
            "p_tweet_text": video.tweet_text,
            "p_tweet_date": video.tweet_date,
            "p_thumbnail_url": video.thumbnail_url,
        }));
        let rows: Vec<UpsertRow> = Self::send(request, "upsert_video")
            .await?
            .json()
            .await
            .context("Failed to decode upsert_video result")?;

        let row = rows
            .into_iter()
            .next()
            .context("upsert_video returned no rows")?;
        Ok(UpsertOutcome {
            created: row.created,
            total_downloads: row.total_downloads,
        })
    }

    async fn record_download_links(
        &self,
        tweet_id: &str,
        links: &[NewDownloadLink],
    ) -> Result<()> {
        let request = self
            .client
            .post(self.rpc("record_download_links"))
            .json(&json!({ "p_tweet_id": tweet_id, "p_links": links }));
        Self::send(request, "record_download_links").await?;
        Ok(())
    }

    async fn list_download_links(&self) -> Result<Vec<DownloadLink>> {
        let request = self
            .client
            .get(self.table("download_links"))
            .query(&[("select", "*"), ("order", "id.asc")]);
        Self::send(request, "list download links")
            .await?
            .json()
            .await
            .context("Failed to decode download links")
    }

    async fn insert_request(&self, request: &NewRequest) -> Result<()> {
        let http = self
            .client
            .post(self.table("requests"))
            .header("Prefer", "return=minimal")
            .json(&json!({
                "ip_address": request.ip_address,
                "user_agent": request.user_agent,
                "device_type": request.device_type.as_str(),
                "browser": request.browser,
                "platform": request.platform,
                "twitter_url": request.twitter_url,
                "endpoint": request.endpoint,
            }));
        Self::send(http, "insert request").await?;
        Ok(())
    }

    async fn list_top_videos(&self, limit: usize) -> Result<Vec<Video>> {
        let request = self.client.get(self.table("videos")).query(&[
            ("select", "*".to_string()),
            ("order", "total_downloads.desc,id.asc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Self::send(request, "list top videos")
            .await?
            .json()
            .await
            .context("Failed to decode videos")
    }

    async fn list_videos(&self) -> Result<Vec<Video>> {
        let request = self
            .client
            .get(self.table("videos"))
            .query(&[("select", "*"), ("order", "id.asc")]);
        Self::send(request, "list videos")
            .await?
            .json()
            .await
            .context("Failed to decode videos")
    }

    async fn list_recent_requests(&self, limit: usize) -> Result<Vec<RequestRecord>> {
        let request = self.client.get(self.table("requests")).query(&[
            ("select", "*".to_string()),
            ("order", "id.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Self::send(request, "list requests")
            .await?
            .json()
            .await
            .context("Failed to decode requests")
    }

    async fn count_requests(&self) -> Result<i64> {
        self.count("requests").await
    }

    async fn count_videos(&self) -> Result<i64> {
        self.count("videos").await
    }

    async fn device_histogram(&self) -> Result<Vec<(String, i64)>> {
        // PostgREST aggregates are often disabled, so count client side
        let request = self
            .client
            .get(self.table("requests"))
            .query(&[("select", "device_type")]);
        let rows: Vec<DeviceRow> = Self::send(request, "list device types")
            .await?
            .json()
            .await
            .context("Failed to decode device types")?;

        let mut histogram: Vec<(String, i64)> = Vec::new();
        for row in rows {
            match histogram.iter_mut().find(|(device, _)| *device == row.device_type) {
                Some((_, count)) => *count += 1,
                None => histogram.push((row.device_type, 1)),
            }
        }
        histogram.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(histogram)
    }

    async fn counters(&self) -> Result<Counters> {
        let request = self
            .client
            .get(self.table("stats"))
            .query(&[("select", "total_requests,total_videos"), ("id", "eq.1")]);
        let rows: Vec<Counters> = Self::send(request, "fetch counters")
            .await?
            .json()
            .await
            .context("Failed to decode counters")?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn increment_requests(&self) -> Result<()> {
        let request = self
            .client
            .post(self.rpc("increment_stat"))
            .json(&json!({ "field_name": "total_requests" }));
        Self::send(request, "increment_stat").await?;
        Ok(())
    }

    async fn ban(&self, address: &str) -> Result<()> {
        let request = self
            .client
            .post(self.table("bans"))
            .query(&[("on_conflict", "ip_address")])
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&json!({ "ip_address": address }));
        Self::send(request, "insert ban").await?;
        Ok(())
    }

    async fn is_banned(&self, address: &str) -> Result<bool> {
        let request = self.client.get(self.table("bans")).query(&[
            ("select", "ip_address".to_string()),
            ("ip_address", format!("eq.{address}")),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<serde_json::Value> = Self::send(request, "check ban list")
            .await?
            .json()
            .await
            .context("Failed to decode ban list")?;
        Ok(!rows.is_empty())
    }

    async fn purge(&self, target: PurgeTarget) -> Result<()> {
        match target {
            PurgeTarget::Counters => {
                self.set_counters(json!({ "total_requests": 0, "total_videos": 0 }))
                    .await?;
            }
            PurgeTarget::Requests => {
                // PostgREST refuses unfiltered deletes
                let request = self
                    .client
                    .delete(self.table("requests"))
                    .query(&[("id", "gt.0")]);
                Self::send(request, "clear requests").await?;
            }
            PurgeTarget::Videos => {
                let request = self
                    .client
                    .delete(self.table("download_links"))
                    .query(&[("id", "gt.0")]);
                Self::send(request, "clear download links").await?;
                let request = self
                    .client
                    .delete(self.table("videos"))
                    .query(&[("id", "gt.0")]);
                Self::send(request, "clear videos").await?;
                self.set_counters(json!({ "total_videos": 0 })).await?;
            }
        }
        Ok(())
    }

    async fn append_log(&self, message: &str) -> Result<()> {
        let request = self
            .client
            .post(self.table("logs"))
            .header("Prefer", "return=minimal")
            .json(&json!({ "message": message }));
        Self::send(request, "insert log line").await?;
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<LogLine>> {
        let request = self.client.get(self.table("logs")).query(&[
            ("select", "*".to_string()),
            ("order", "id.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Self::send(request, "list log lines")
            .await?
            .json()
            .await
            .context("Failed to decode log lines")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-0/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-0/*"), None);
    }

    #[test]
    fn test_urls() {
        let store = SupabaseStore::new("https://abc.supabase.co/", "key").unwrap();
        assert_eq!(store.table("videos"), "https://abc.supabase.co/rest/v1/videos");
        assert_eq!(
            store.rpc("increment_stat"),
            "https://abc.supabase.co/rest/v1/rpc/increment_stat"
        );
    }
}

//! Read-only summary views over the store.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::db::{Counters, Store, Video};

/// A popular video as shown on the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularVideo {
    pub tweet_id: String,
    pub author: String,
    pub total_downloads: i64,
}

impl From<Video> for PopularVideo {
    fn from(video: Video) -> Self {
        Self {
            tweet_id: video.tweet_id,
            author: video.author,
            total_downloads: video.total_downloads,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    /// Request records currently held by the store.
    pub total_requests: i64,
    /// Distinct videos currently held by the store.
    pub total_videos: i64,
    pub popular_videos: Vec<PopularVideo>,
    pub device_stats: BTreeMap<String, i64>,
    /// Lifetime counters, which survive request-log eviction.
    pub counters: Counters,
}

/// Build the summary. Does not write to the store.
///
/// # Errors
///
/// Returns an error if any of the underlying reads fail.
pub async fn compute_stats(store: &dyn Store, top_n: usize) -> Result<StatsSummary> {
    let total_requests = store.count_requests().await?;
    let total_videos = store.count_videos().await?;
    let popular_videos = store
        .list_top_videos(top_n)
        .await?
        .into_iter()
        .map(PopularVideo::from)
        .collect();
    let device_stats = store.device_histogram().await?.into_iter().collect();
    let counters = store.counters().await?;

    Ok(StatsSummary {
        total_requests,
        total_videos,
        popular_videos,
        device_stats,
        counters,
    })
}

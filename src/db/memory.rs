//! Process-local storage backend.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use super::models::{
    Counters, DownloadLink, LogLine, NewDownloadLink, NewRequest, NewVideo, PurgeTarget,
    RequestRecord, UpsertOutcome, Video,
};
use super::Store;
use crate::config::StorageBackend;
use crate::constants::MEMORY_LOG_RETENTION;

#[derive(Debug, Default)]
struct MemoryState {
    videos: Vec<Video>,
    /// tweet_id -> index into `videos`
    video_index: HashMap<String, usize>,
    next_video_id: i64,
    links: Vec<DownloadLink>,
    /// (tweet_id, download_url) -> index into `links`
    link_index: HashMap<(String, String), usize>,
    next_link_id: i64,
    requests: VecDeque<RequestRecord>,
    next_request_id: i64,
    bans: HashSet<String>,
    counters: Counters,
    logs: VecDeque<LogLine>,
    next_log_id: i64,
}

/// In-memory store owned by one process.
///
/// Every operation runs under a single mutex with no suspension point
/// inside, so an upsert's existence check and mutation are atomic.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    request_retention: usize,
}

impl MemoryStore {
    /// Create an empty store keeping at most `request_retention` request records.
    #[must_use]
    pub fn new(request_retention: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            request_retention: request_retention.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_video(&self, video: &NewVideo) -> Result<UpsertOutcome> {
        let now = Utc::now();
        let mut state = self.state();

        if let Some(&idx) = state.video_index.get(&video.tweet_id) {
            let existing = &mut state.videos[idx];
            existing.total_downloads += 1;
            existing.last_fetched = now;
            return Ok(UpsertOutcome {
                created: false,
                total_downloads: existing.total_downloads,
            });
        }

        state.next_video_id += 1;
        let id = state.next_video_id;
        state.videos.push(Video {
            id,
            tweet_id: video.tweet_id.clone(),
            author: video.author.clone(),
            tweet_text: video.tweet_text.clone(),
            tweet_date: video.tweet_date.clone(),
            thumbnail_url: video.thumbnail_url.clone(),
            total_downloads: 1,
            first_fetched: now,
            last_fetched: now,
        });
        let idx = state.videos.len() - 1;
        state.video_index.insert(video.tweet_id.clone(), idx);
        state.counters.total_videos += 1;

        Ok(UpsertOutcome {
            created: true,
            total_downloads: 1,
        })
    }

    async fn record_download_links(
        &self,
        tweet_id: &str,
        links: &[NewDownloadLink],
    ) -> Result<()> {
        let mut state = self.state();
        for link in links {
            let key = (tweet_id.to_string(), link.download_url.clone());
            if let Some(&idx) = state.link_index.get(&key) {
                state.links[idx].fetch_count += 1;
                continue;
            }

            state.next_link_id += 1;
            let id = state.next_link_id;
            state.links.push(DownloadLink {
                id,
                tweet_id: tweet_id.to_string(),
                download_url: link.download_url.clone(),
                quality: link.quality.clone(),
                resolution: link.resolution.clone(),
                format: link.format.clone(),
                source: link.source.clone(),
                fetch_count: 1,
            });
            let idx = state.links.len() - 1;
            state.link_index.insert(key, idx);
        }
        Ok(())
    }

    async fn list_download_links(&self) -> Result<Vec<DownloadLink>> {
        Ok(self.state().links.clone())
    }

    async fn insert_request(&self, request: &NewRequest) -> Result<()> {
        let mut state = self.state();
        state.next_request_id += 1;
        let id = state.next_request_id;
        state.requests.push_back(RequestRecord {
            id,
            ip_address: request.ip_address.clone(),
            user_agent: request.user_agent.clone(),
            device_type: request.device_type.as_str().to_string(),
            browser: request.browser.clone(),
            platform: request.platform.clone(),
            twitter_url: request.twitter_url.clone(),
            endpoint: request.endpoint.clone(),
            timestamp: Utc::now(),
        });
        while state.requests.len() > self.request_retention {
            state.requests.pop_front();
        }
        Ok(())
    }

    async fn list_top_videos(&self, limit: usize) -> Result<Vec<Video>> {
        let mut videos = self.state().videos.clone();
        // Stable sort keeps insertion order among equal counts
        videos.sort_by(|a, b| b.total_downloads.cmp(&a.total_downloads));
        videos.truncate(limit);
        Ok(videos)
    }

    async fn list_videos(&self) -> Result<Vec<Video>> {
        Ok(self.state().videos.clone())
    }

    async fn list_recent_requests(&self, limit: usize) -> Result<Vec<RequestRecord>> {
        Ok(self
            .state()
            .requests
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_requests(&self) -> Result<i64> {
        Ok(self.state().requests.len() as i64)
    }

    async fn count_videos(&self) -> Result<i64> {
        Ok(self.state().videos.len() as i64)
    }

    async fn device_histogram(&self) -> Result<Vec<(String, i64)>> {
        let state = self.state();
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for request in &state.requests {
            *counts.entry(request.device_type.as_str()).or_insert(0) += 1;
        }
        let mut histogram: Vec<(String, i64)> = counts
            .into_iter()
            .map(|(device, count)| (device.to_string(), count))
            .collect();
        histogram.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(histogram)
    }

    async fn counters(&self) -> Result<Counters> {
        Ok(self.state().counters)
    }

    async fn increment_requests(&self) -> Result<()> {
        self.state().counters.total_requests += 1;
        Ok(())
    }

    async fn ban(&self, address: &str) -> Result<()> {
        self.state().bans.insert(address.to_string());
        Ok(())
    }

    async fn is_banned(&self, address: &str) -> Result<bool> {
        Ok(self.state().bans.contains(address))
    }

    async fn purge(&self, target: PurgeTarget) -> Result<()> {
        let mut state = self.state();
        match target {
            PurgeTarget::Counters => state.counters = Counters::default(),
            PurgeTarget::Requests => state.requests.clear(),
            PurgeTarget::Videos => {
                state.videos.clear();
                state.video_index.clear();
                state.links.clear();
                state.link_index.clear();
                state.counters.total_videos = 0;
            }
        }
        Ok(())
    }

    async fn append_log(&self, message: &str) -> Result<()> {
        let mut state = self.state();
        state.next_log_id += 1;
        let id = state.next_log_id;
        state.logs.push_back(LogLine {
            id,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        while state.logs.len() > MEMORY_LOG_RETENTION {
            state.logs.pop_front();
        }
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<LogLine>> {
        Ok(self.state().logs.iter().rev().take(limit).cloned().collect())
    }
}

//! In-process traffic and upstream monitoring.
//!
//! Everything here lives in memory and resets on restart, independent of
//! the storage backend.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::{MONITOR_ERRORS_SHOWN, MONITOR_ERROR_RETENTION, MONITOR_LATENCY_SAMPLES};

/// Window the request rate is computed over.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// A recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Point-in-time view served on `/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub requests_per_second: f64,
    pub requests_last_minute: usize,
    pub total_requests_tracked: u64,
    pub avg_upstream_latency_ms: f64,
    pub upstream_samples: usize,
    /// Newest first.
    pub last_errors: Vec<ErrorEntry>,
}

#[derive(Debug, Default)]
struct MonitorState {
    recent: VecDeque<Instant>,
    tracked: u64,
    latencies_ms: VecDeque<f64>,
    errors: VecDeque<ErrorEntry>,
}

/// Request rate, upstream latency and recent errors for this process.
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
}

impl Monitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one inbound request.
    pub fn track_request(&self) {
        self.track_request_at(Instant::now());
    }

    fn track_request_at(&self, now: Instant) {
        let mut state = self.state();
        state.tracked += 1;
        state.recent.push_back(now);
        while let Some(&front) = state.recent.front() {
            if now.duration_since(front) > RATE_WINDOW {
                state.recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record how long an upstream fetch took.
    pub fn track_latency(&self, elapsed: Duration) {
        let mut state = self.state();
        state.latencies_ms.push_back(elapsed.as_secs_f64() * 1000.0);
        while state.latencies_ms.len() > MONITOR_LATENCY_SAMPLES {
            state.latencies_ms.pop_front();
        }
    }

    /// Remember a failure for `/health`.
    pub fn log_error(&self, message: impl Into<String>) {
        let mut state = self.state();
        state.errors.push_back(ErrorEntry {
            message: message.into(),
            time: Utc::now(),
        });
        while state.errors.len() > MONITOR_ERROR_RETENTION {
            state.errors.pop_front();
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> MonitorSnapshot {
        let state = self.state();

        let requests_last_minute = state
            .recent
            .iter()
            .filter(|&&at| now.duration_since(at) <= RATE_WINDOW)
            .count();

        let avg_upstream_latency_ms = if state.latencies_ms.is_empty() {
            0.0
        } else {
            state.latencies_ms.iter().sum::<f64>() / state.latencies_ms.len() as f64
        };

        let requests_per_second = requests_last_minute as f64 / RATE_WINDOW.as_secs_f64();

        MonitorSnapshot {
            requests_per_second: round_to(requests_per_second, 3),
            requests_last_minute,
            total_requests_tracked: state.tracked,
            avg_upstream_latency_ms: round_to(avg_upstream_latency_ms, 2),
            upstream_samples: state.latencies_ms.len(),
            last_errors: state
                .errors
                .iter()
                .rev()
                .take(MONITOR_ERRORS_SHOWN)
                .cloned()
                .collect(),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

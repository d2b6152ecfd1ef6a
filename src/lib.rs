//! Tweet video download API library.
//!
//! Resolves downloadable video links for Twitter/X posts by scraping an
//! upstream download page, and records requests, videos and bans in a
//! pluggable store.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod db;
pub mod extractor;
pub mod monitor;
pub mod request_log;
pub mod resolver;
pub mod stats;
pub mod upstream;
pub mod web;

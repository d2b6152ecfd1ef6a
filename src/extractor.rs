//! Download-link extraction from the upstream HTML page.
//!
//! The upstream renders one page per tweet: author and text near the top,
//! a `<video>` preview, and a table of `/download?file=` links labelled with
//! their resolution.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::constants::CANDIDATE_SOURCE;
use crate::db::NewDownloadLink;

static LABELLED_RESOLUTION: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"(?i)Resolution:\s*(\d+x\d+)").unwrap());

static BARE_RESOLUTION: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"(\d+x\d+)").unwrap());

static SELECTORS: std::sync::LazyLock<Selectors> = std::sync::LazyLock::new(Selectors::new);

struct Selectors {
    author: Selector,
    text: Selector,
    date: Selector,
    video: Selector,
    download: Selector,
    label: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            author: Selector::parse(r#"a[href*="twitter.com"]"#).unwrap(),
            text: Selector::parse("p.m-2").unwrap(),
            date: Selector::parse("a.text-xs").unwrap(),
            video: Selector::parse("video").unwrap(),
            download: Selector::parse(r#"a[href*="/download?file="]"#).unwrap(),
            label: Selector::parse(".truncate").unwrap(),
        }
    }
}

/// Coarse quality tier derived from a resolution label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Hd,
    Sd,
    Low,
    Unknown,
}

impl QualityTier {
    /// Classify a `WIDTHxHEIGHT` label against the known upstream renditions.
    #[must_use]
    pub fn from_resolution(resolution: &str) -> Self {
        match resolution {
            "1688x720" | "1280x720" | "1920x1080" => Self::Hd,
            "844x360" | "640x360" => Self::Sd,
            "632x270" | "480x270" => Self::Low,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hd => "hd",
            Self::Sd => "sd",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

/// One downloadable rendition of the tweet's video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadCandidate {
    pub url: String,
    pub quality: QualityTier,
    pub resolution: String,
    #[serde(rename = "type")]
    pub format: &'static str,
    pub source: &'static str,
}

impl From<&DownloadCandidate> for NewDownloadLink {
    fn from(candidate: &DownloadCandidate) -> Self {
        Self {
            download_url: candidate.url.clone(),
            quality: candidate.quality.as_str().to_string(),
            resolution: candidate.resolution.clone(),
            format: candidate.format.to_string(),
            source: candidate.source.to_string(),
        }
    }
}

/// Tweet metadata shown alongside the download links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetInfo {
    pub author: String,
    pub text: String,
    pub date: String,
    pub tweet_url: String,
}

/// Everything extracted from one upstream page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub tweet_info: TweetInfo,
    pub thumbnail: Option<String>,
    pub video_preview: Option<String>,
    pub download_links: Vec<DownloadCandidate>,
}

impl Extraction {
    /// True when at least one download link was found.
    #[must_use]
    pub fn has_downloads(&self) -> bool {
        !self.download_links.is_empty()
    }
}

/// Extract tweet metadata and download links from an upstream page.
///
/// Missing elements fall back to defaults; a page without download links
/// yields an empty `download_links` list rather than an error.
#[must_use]
pub fn extract(html: &str, source_url: &str, base_url: &str) -> Extraction {
    let document = Html::parse_document(html);
    let sel = &*SELECTORS;

    let author = document
        .select(&sel.author)
        .next()
        .map(|el| element_text(&el))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let text = document
        .select(&sel.text)
        .map(|el| element_text(&el))
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string();

    let date_link = document.select(&sel.date).next();
    let date = date_link.map(|el| element_text(&el)).unwrap_or_default();
    let tweet_url = date_link
        .and_then(|el| el.value().attr("href"))
        .filter(|s| !s.is_empty())
        .unwrap_or(source_url)
        .to_string();

    let video = document.select(&sel.video).next();
    let thumbnail = video
        .and_then(|el| el.value().attr("poster"))
        .filter(|s| !s.is_empty())
        .map(String::from);
    let video_preview = video
        .and_then(|el| el.value().attr("src"))
        .filter(|s| !s.is_empty())
        .map(String::from);

    let download_links = document
        .select(&sel.download)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let label = anchor
                .select(&sel.label)
                .next()
                .map_or_else(|| element_text(&anchor), |el| element_text(&el));
            let resolution = parse_resolution(&label);

            Some(DownloadCandidate {
                url: absolute_url(base_url, href),
                quality: QualityTier::from_resolution(&resolution),
                resolution,
                format: "mp4",
                source: CANDIDATE_SOURCE,
            })
        })
        .collect();

    Extraction {
        tweet_info: TweetInfo {
            author,
            text,
            date,
            tweet_url,
        },
        thumbnail,
        video_preview,
        download_links,
    }
}

/// Pull a `WIDTHxHEIGHT` token out of a link label.
#[must_use]
pub fn parse_resolution(label: &str) -> String {
    LABELLED_RESOLUTION
        .captures(label)
        .or_else(|| BARE_RESOLUTION.captures(label))
        .and_then(|c| c.get(1))
        .map_or_else(|| "unknown".to_string(), |m| m.as_str().to_string())
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{base_url}{href}")
    } else {
        format!("{base_url}/{href}")
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

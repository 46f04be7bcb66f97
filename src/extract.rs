//! URL classification and best-effort text extraction.
//!
//! [`classify`] looks only at the hostname and never touches the network.
//! [`Extractor::extract`] fetches the page once (no retry) and scrapes it
//! with a handful of regular expressions:
//!
//! | Content type | Title | Body |
//! |--------------|-------|------|
//! | `article` | `<title>` or hostname | tags stripped, whitespace collapsed, truncated |
//! | `video` / `podcast` | `<title>` or hostname | `<meta name="description">` or a placeholder naming the URL |
//!
//! This is shallow scraping, not DOM parsing; pages that build their
//! content client-side will yield little text.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use reqwest::Url;
use thiserror::Error;

use thoughtsynth_core::models::ContentType;

use crate::config::ExtractConfig;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").expect("title regex is valid"));
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script regex is valid")
});
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex is valid"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex is valid"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));
static META_DESC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]*name="description"[^>]*content="([^"]*)"[^>]*>"#)
        .expect("meta description regex is valid")
});

const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com"];
const PODCAST_HOSTS: &[&str] = &["spotify.com", "soundcloud.com", "podcast"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("fetching {url} timed out")]
    Timeout { url: String },
}

/// Title and body scraped from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub body: String,
}

fn parse_url(url: &str) -> Result<Url, ExtractError> {
    let parsed = Url::parse(url).map_err(|e| ExtractError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.host_str().is_none() {
        return Err(ExtractError::InvalidUrl {
            url: url.to_string(),
            reason: "URL has no host".to_string(),
        });
    }
    Ok(parsed)
}

/// Classify a URL by hostname.
pub fn classify(url: &str) -> Result<ContentType, ExtractError> {
    let parsed = parse_url(url)?;
    let host = parsed.host_str().unwrap_or_default().to_lowercase();

    let content_type = if VIDEO_HOSTS.iter().any(|h| host.contains(h)) {
        ContentType::Video
    } else if PODCAST_HOSTS.iter().any(|h| host.contains(h)) {
        ContentType::Podcast
    } else {
        ContentType::Article
    };
    Ok(content_type)
}

/// Scrape a fetched HTML document. Pure; exposed for testing.
pub fn scrape(html: &str, url: &Url, content_type: ContentType, max_body_chars: usize) -> Extracted {
    let title = TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(m.as_str()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.host_str().unwrap_or_default().to_string());

    let body = match content_type {
        ContentType::Article => {
            let text = SCRIPT_RE.replace_all(html, "");
            let text = STYLE_RE.replace_all(&text, "");
            let text = TAG_RE.replace_all(&text, " ");
            truncate_chars(&collapse_whitespace(&text), max_body_chars)
        }
        ContentType::Video => meta_description(html)
            .unwrap_or_else(|| format!("Video content from {}", url)),
        ContentType::Podcast => meta_description(html)
            .unwrap_or_else(|| format!("Podcast content from {}", url)),
    };

    Extracted { title, body }
}

fn meta_description(html: &str) -> Option<String> {
    META_DESC_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// HTTP fetcher + scraper.
pub struct Extractor {
    client: reqwest::Client,
    max_body_chars: usize,
}

impl Extractor {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_body_chars: config.max_body_chars,
        })
    }

    /// Fetch `url` and scrape it according to `content_type`.
    pub async fn extract(
        &self,
        url: &str,
        content_type: ContentType,
    ) -> Result<Extracted, ExtractError> {
        let parsed = parse_url(url)?;

        let fetch_err = |source: reqwest::Error| {
            if source.is_timeout() {
                ExtractError::Timeout {
                    url: url.to_string(),
                }
            } else {
                ExtractError::Fetch {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(fetch_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(fetch_err)?;
        tracing::debug!(url, bytes = html.len(), %content_type, "fetched page");

        Ok(scrape(&html, &parsed, content_type, self.max_body_chars))
    }
}

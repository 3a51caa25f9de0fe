//! Tour-page feed: fetches the artist's live page and extracts one
//! `ShowDate` per date entry.
//!
//! The page nests each show inside `<li class="date-item">` with
//! `googleDate`, `s_venue`, `addressLocality` and `addressCountry` fields.
//! Extraction is regex-based over that two-level structure; a malformed
//! entry is skipped on its own, only a page without the live container at
//! all fails the fetch.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use encore_platform::FetchError;

use crate::items::ShowDate;
use crate::showdates::display_from_raw;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const LIVE_CONTAINER_MARKER: &str = "liveContainer";

/// Producer contract for the show synchronizer.
#[async_trait]
pub trait ShowSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ShowDate>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct TourFeedConfig {
    pub page_url: String,
    pub timeout_ms: u64,
}

impl TourFeedConfig {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TourPageParser {
    item: Regex,
    date: Regex,
    venue: Regex,
    locality: Regex,
    country: Regex,
    href: Regex,
    image: Regex,
}

impl TourPageParser {
    pub(crate) fn new() -> Result<Self, FetchError> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|error| FetchError::Decode {
                detail: format!("invalid tour page pattern: {error}"),
            })
        };
        Ok(Self {
            item: build(r#"(?s)<li[^>]*class="[^"]*date-item[^"]*"[^>]*>(.*?)</li>"#)?,
            date: build(r#"(?s)<div[^>]*class="[^"]*googleDate[^"]*"[^>]*>(.*?)</div>"#)?,
            venue: build(r#"(?s)<div[^>]*class="[^"]*s_venue[^"]*"[^>]*>(.*?)</div>"#)?,
            locality: build(r#"(?s)<span[^>]*class="[^"]*addressLocality[^"]*"[^>]*>(.*?)</span>"#)?,
            country: build(r#"(?s)<span[^>]*class="[^"]*addressCountry[^"]*"[^>]*>(.*?)</span>"#)?,
            href: build(r#"<a[^>]*href="([^"]+)""#)?,
            image: build(r#"<img[^>]*src="([^"]+)""#)?,
        })
    }

    pub(crate) fn parse(&self, html: &str) -> Result<Vec<ShowDate>, FetchError> {
        if !html.contains(LIVE_CONTAINER_MARKER) {
            return Err(FetchError::Decode {
                detail: "live container not found on tour page".to_string(),
            });
        }

        let mut shows = Vec::new();
        for item in self.item.captures_iter(html) {
            let block = &item[1];
            let raw_date = self.field_text(&self.date, block);
            let venue = self.field_text(&self.venue, block);
            if raw_date.is_empty() && venue.is_empty() {
                tracing::debug!("skipping tour entry without date or venue");
                continue;
            }

            let locality = trim_trailing_comma(&self.field_text(&self.locality, block));
            let country = trim_trailing_comma(&self.field_text(&self.country, block));
            let location = match (locality.is_empty(), country.is_empty()) {
                (false, false) => format!("{locality}, {country}"),
                (false, true) => locality,
                (true, false) => country,
                (true, true) => String::new(),
            };

            shows.push(ShowDate {
                date: display_from_raw(&raw_date),
                venue,
                location,
                url: self.attribute(&self.href, block),
                image_url: self.attribute(&self.image, block),
            });
        }
        Ok(shows)
    }

    fn field_text(&self, pattern: &Regex, block: &str) -> String {
        pattern
            .captures(block)
            .map(|captures| strip_tags(&captures[1]))
            .unwrap_or_default()
    }

    fn attribute(&self, pattern: &Regex, block: &str) -> Option<String> {
        pattern
            .captures(block)
            .map(|captures| captures[1].trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_trailing_comma(value: &str) -> String {
    value.trim_end_matches(',').trim().to_string()
}

#[derive(Debug)]
pub struct TourFeed {
    config: TourFeedConfig,
    client: reqwest::Client,
    parser: TourPageParser,
}

impl TourFeed {
    pub fn new(config: TourFeedConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| FetchError::Transport {
                detail: error.to_string(),
            })?;
        Ok(Self {
            config,
            client,
            parser: TourPageParser::new()?,
        })
    }
}

#[async_trait]
impl ShowSource for TourFeed {
    async fn fetch(&self) -> Result<Vec<ShowDate>, FetchError> {
        let response = self
            .client
            .get(&self.config.page_url)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    FetchError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                } else {
                    FetchError::Transport {
                        detail: error.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(|error| FetchError::Decode {
            detail: error.to_string(),
        })?;
        let shows = self.parser.parse(&html)?;
        tracing::debug!(
            page = self.config.page_url.as_str(),
            shows = shows.len(),
            "tour page fetched"
        );
        Ok(shows)
    }
}

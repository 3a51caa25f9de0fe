//! Instagram profile feed: polls the public `web_profile_info` endpoint and
//! normalizes timeline posts into `InstagramPost` items, oldest first.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use encore_platform::FetchError;

use crate::items::InstagramPost;

const DEFAULT_API_BASE: &str = "https://i.instagram.com/api/v1";
/// The endpoint only answers the mobile app's user agent.
const MOBILE_USER_AGENT: &str = "Instagram 155.0.0.37.107 Android";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Producer contract for the Instagram poll monitor.
#[async_trait]
pub trait InstagramSource: Send + Sync {
    fn username(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<InstagramPost>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct InstagramFeedConfig {
    pub username: String,
    pub api_base: String,
    pub timeout_ms: u64,
}

impl InstagramFeedConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug)]
pub struct InstagramFeed {
    config: InstagramFeedConfig,
    client: reqwest::Client,
}

impl InstagramFeed {
    pub fn new(config: InstagramFeedConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| FetchError::Transport {
                detail: error.to_string(),
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl InstagramSource for InstagramFeed {
    fn username(&self) -> &str {
        &self.config.username
    }

    async fn fetch(&self) -> Result<Vec<InstagramPost>, FetchError> {
        let endpoint = format!(
            "{}/users/web_profile_info/?username={}",
            self.config.api_base.trim_end_matches('/'),
            self.config.username
        );
        let response = self
            .client
            .get(&endpoint)
            .header("User-Agent", MOBILE_USER_AGENT)
            .header("Accept", "*/*")
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

        let profile: ProfileResponse = response.json().await.map_err(|error| {
            FetchError::Decode {
                detail: error.to_string(),
            }
        })?;

        let mut posts: Vec<InstagramPost> = profile
            .data
            .user
            .edge_owner_to_timeline_media
            .edges
            .into_iter()
            .filter_map(|edge| {
                let node = edge.node;
                if node.shortcode.is_empty() {
                    return None;
                }
                let caption = node
                    .edge_media_to_caption
                    .edges
                    .into_iter()
                    .next()
                    .map(|edge| edge.node.text)
                    .unwrap_or_default();
                Some(InstagramPost {
                    post_id: node.shortcode,
                    caption,
                    image_url: node.display_url,
                    taken_at_unix: node.taken_at_timestamp,
                })
            })
            .collect();

        // The endpoint lists newest first; announcements go out oldest first.
        posts.sort_by_key(|post| post.taken_at_unix);
        tracing::debug!(
            username = self.config.username.as_str(),
            posts = posts.len(),
            "instagram profile fetched"
        );
        Ok(posts)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    data: ProfileData,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileData {
    #[serde(default)]
    user: ProfileUser,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileUser {
    #[serde(default)]
    edge_owner_to_timeline_media: TimelineMedia,
}

#[derive(Debug, Default, Deserialize)]
struct TimelineMedia {
    #[serde(default)]
    edges: Vec<TimelineEdge>,
}

#[derive(Debug, Default, Deserialize)]
struct TimelineEdge {
    #[serde(default)]
    node: TimelineNode,
}

#[derive(Debug, Default, Deserialize)]
struct TimelineNode {
    #[serde(default)]
    shortcode: String,
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default)]
    taken_at_timestamp: i64,
    #[serde(default)]
    edge_media_to_caption: CaptionEdges,
}

#[derive(Debug, Default, Deserialize)]
struct CaptionEdges {
    #[serde(default)]
    edges: Vec<CaptionEdge>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptionEdge {
    #[serde(default)]
    node: CaptionNode,
}

#[derive(Debug, Default, Deserialize)]
struct CaptionNode {
    #[serde(default)]
    text: String,
}

//! Instagram poll monitor: announces new posts from the monitored profile
//! into the configured channel.
//!
//! A `ReconcileFeature` with last-seen checkpoint semantics: the scope
//! holds one row keyed by username whose value is the last announced post
//! id, so restarting the process never re-announces an already-posted
//! update.

use std::sync::Arc;

use async_trait::async_trait;

use encore_feeds::{InstagramPost, InstagramSource};
use encore_platform::{
    ActionError, ChannelId, ChatPlatform, EmbedSpec, FetchError, OutboundMessage, RoleId,
};
use encore_reconcile::{ActionReceipt, ReconcileFeature};
use encore_store::SCOPE_INSTAGRAM_LAST;

const ANNOUNCE_EMBED_TITLE: &str = "\u{1f4f8} New Instagram Post";
const NO_CAPTION_PLACEHOLDER: &str = "*No caption*";
const ANNOUNCE_EMBED_COLOR: u32 = 0xE91E63;

#[derive(Debug, Clone)]
pub struct InstagramAnnouncerConfig {
    pub announce_channel: ChannelId,
    /// Role mentioned ahead of the embed, when configured.
    pub ping_role: Option<RoleId>,
}

/// Announces never-seen posts, oldest first.
pub struct InstagramAnnouncer {
    source: Arc<dyn InstagramSource>,
    platform: Arc<dyn ChatPlatform>,
    config: InstagramAnnouncerConfig,
}

impl InstagramAnnouncer {
    pub fn new(
        source: Arc<dyn InstagramSource>,
        platform: Arc<dyn ChatPlatform>,
        config: InstagramAnnouncerConfig,
    ) -> Self {
        Self {
            source,
            platform,
            config,
        }
    }

    fn announcement(&self, post: &InstagramPost) -> OutboundMessage {
        let username = self.source.username();
        let embed = EmbedSpec {
            title: Some(ANNOUNCE_EMBED_TITLE.to_string()),
            description: if post.caption.is_empty() {
                NO_CAPTION_PLACEHOLDER.to_string()
            } else {
                post.caption.clone()
            },
            url: Some(post.post_url()),
            color: Some(ANNOUNCE_EMBED_COLOR),
            image_url: post.image_url.clone(),
            author_name: Some(format!("@{username}")),
            author_url: Some(format!("https://www.instagram.com/{username}/")),
            author_icon_url: None,
            timestamp_unix: Some(post.taken_at_unix),
        };
        let mut message = OutboundMessage::embed(self.config.announce_channel, embed);
        if let Some(role) = self.config.ping_role {
            message = message.with_content(format!("<@&{role}> "));
        }
        message
    }
}

#[async_trait]
impl ReconcileFeature for InstagramAnnouncer {
    type Item = InstagramPost;

    fn name(&self) -> &'static str {
        "instagram"
    }

    fn scope(&self) -> &'static str {
        SCOPE_INSTAGRAM_LAST
    }

    /// Only the newest timeline post is observed. The profile timeline
    /// always contains posts announced long before the current checkpoint
    /// value; with a single last-seen row, older entries must never look
    /// "new" again.
    async fn observe(&self) -> Result<Vec<InstagramPost>, FetchError> {
        let posts = self.source.fetch().await?;
        Ok(posts.into_iter().last().into_iter().collect())
    }

    fn identity(&self, post: &InstagramPost) -> String {
        post.identity()
    }

    /// One replaced row per username: last-seen semantics.
    fn checkpoint_key(&self, _post: &InstagramPost) -> String {
        self.source.username().to_string()
    }

    async fn act(&self, post: &InstagramPost) -> Result<ActionReceipt, ActionError> {
        self.platform.post_message(&self.announcement(post)).await?;
        tracing::info!(
            post_id = post.post_id.as_str(),
            channel = %self.config.announce_channel,
            "instagram post announced"
        );
        Ok(ActionReceipt {
            kind: "instagram_post_announced",
            target: post.post_id.clone(),
        })
    }
}

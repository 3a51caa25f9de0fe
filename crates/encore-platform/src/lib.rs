//! Chat-platform client contract for the encore reconciliation core.
//!
//! The core never manages platform connection or auth; it consumes the
//! primitives declared here. `ChatPlatform` is the seam every feature acts
//! through, `PlatformEvent` is the ingress side pushed by whichever gateway
//! integration hosts the core, and `rest` provides the Discord REST-backed
//! implementation used by the binary.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod errors;
pub mod events;
pub mod rest;
pub mod testing;

pub use errors::{ActionError, FetchError};
pub use events::{MemberJoined, PlatformEvent};

macro_rules! snowflake_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake_id!(ChannelId);
snowflake_id!(MessageId);
snowflake_id!(UserId);
snowflake_id!(RoleId);
snowflake_id!(ScheduledEventId);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Platform-agnostic embed payload.
pub struct EmbedSpec {
    pub title: Option<String>,
    pub description: String,
    pub url: Option<String>,
    pub color: Option<u32>,
    pub image_url: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub author_icon_url: Option<String>,
    pub timestamp_unix: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One outbound channel message: plain content, an embed, or both.
pub struct OutboundMessage {
    pub channel: ChannelId,
    pub content: Option<String>,
    pub embed: Option<EmbedSpec>,
}

impl OutboundMessage {
    pub fn text(channel: ChannelId, content: impl Into<String>) -> Self {
        Self {
            channel,
            content: Some(content.into()),
            embed: None,
        }
    }

    pub fn embed(channel: ChannelId, embed: EmbedSpec) -> Self {
        Self {
            channel,
            content: None,
            embed: Some(embed),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Request to open a discussion thread with a starter message.
pub struct ThreadSpec {
    pub channel: ChannelId,
    pub title: String,
    pub message: String,
    pub auto_archive_minutes: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// An existing thread as seen by duplicate checks: title plus starter text.
pub struct ThreadSummary {
    pub id: ChannelId,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
/// Request to create a scheduled calendar event on the platform.
pub struct ScheduledEventSpec {
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_unix: i64,
    pub end_unix: i64,
}

/// Primitives the reconciliation core consumes. Implementations must be
/// safe to call twice for the same logical action; the core relies on that
/// for retry tolerance, not for deduplication.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn post_message(&self, message: &OutboundMessage) -> Result<MessageId, ActionError>;

    /// Deleting an already-gone message must surface `ActionError::NotFound`.
    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), ActionError>;

    async fn create_thread(&self, spec: &ThreadSpec) -> Result<ChannelId, ActionError>;

    async fn list_threads(&self, channel: ChannelId) -> Result<Vec<ThreadSummary>, ActionError>;

    async fn create_scheduled_event(
        &self,
        spec: &ScheduledEventSpec,
    ) -> Result<ScheduledEventId, ActionError>;

    async fn list_scheduled_event_names(&self) -> Result<Vec<String>, ActionError>;

    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<(), ActionError>;
}

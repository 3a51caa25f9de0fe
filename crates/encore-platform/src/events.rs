//! Ingress events pushed into the core by the hosting gateway integration.

use crate::{ChannelId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq)]
/// A member who just joined the community.
pub struct MemberJoined {
    pub user: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq)]
/// Event stream the runtime subscribes the core to.
pub enum PlatformEvent {
    MessageCreated {
        channel: ChannelId,
        message: MessageId,
        /// True when the message was authored by this bot itself; sticky
        /// reposts must not trigger further reposts.
        author_is_self: bool,
    },
    MessageDeleted {
        channel: ChannelId,
        message: MessageId,
    },
    MemberJoined(MemberJoined),
}

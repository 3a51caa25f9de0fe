//! Sticky message manager: keeps one message pinned to the bottom of each
//! configured channel's history.
//!
//! Reposting is always delete-then-create; editing cannot move a message in
//! history. Message bursts coalesce through a debounce window so the sticky
//! is reposted once per burst, not once per message. An external deletion
//! of the sticky cancels any pending debounce and reposts immediately.
//! Invariant: at most one live sticky post per channel; the persisted row
//! always references the live message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use encore_core::{AuditEvent, AuditLog, AuditOutcome};
use encore_platform::{
    ActionError, ChannelId, ChatPlatform, EmbedSpec, MessageId, OutboundMessage,
};
use encore_store::{CheckpointStore, StickyRecord, StorageError};

const DEFAULT_DEBOUNCE_MS: u64 = 1_000;
const STICKY_EMBED_TITLE: &str = "Sticky Message";
const FORMAT_NORMAL: &str = "normal";
const FORMAT_EMBED: &str = "embed";

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a channel's sticky looks like: plain text or an embed with an
/// optional colour.
pub enum StickyContent {
    Text(String),
    Embed { body: String, color: Option<u32> },
}

impl StickyContent {
    fn format_tag(&self) -> &'static str {
        match self {
            Self::Text(_) => FORMAT_NORMAL,
            Self::Embed { .. } => FORMAT_EMBED,
        }
    }

    fn body(&self) -> &str {
        match self {
            Self::Text(body) => body,
            Self::Embed { body, .. } => body,
        }
    }

    fn color(&self) -> Option<u32> {
        match self {
            Self::Text(_) => None,
            Self::Embed { color, .. } => *color,
        }
    }

    fn from_record(record: &StickyRecord) -> Self {
        if record.format == FORMAT_EMBED {
            Self::Embed {
                body: record.content.clone(),
                color: record.color,
            }
        } else {
            Self::Text(record.content.clone())
        }
    }

    fn to_outbound(&self, channel: ChannelId) -> OutboundMessage {
        match self {
            Self::Text(body) => OutboundMessage::text(channel, body.clone()),
            Self::Embed { body, color } => OutboundMessage::embed(
                channel,
                EmbedSpec {
                    title: Some(STICKY_EMBED_TITLE.to_string()),
                    description: body.clone(),
                    color: *color,
                    ..EmbedSpec::default()
                },
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StickyConfig {
    /// How long to wait after a message before reposting, so bursts cost
    /// one repost instead of one per message.
    pub debounce: Duration,
    /// Immediate retries for transient platform failures.
    pub action_retry_limit: usize,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            action_retry_limit: 1,
        }
    }
}

struct ChannelEntry {
    content: StickyContent,
    message_id: MessageId,
    repost_lock: Arc<tokio::sync::Mutex<()>>,
    pending: Option<JoinHandle<()>>,
}

/// Per-channel sticky state machine. Channels without an entry are
/// inactive; an entry with a pending debounce task is awaiting a repost.
pub struct StickyManager {
    store: Arc<CheckpointStore>,
    platform: Arc<dyn ChatPlatform>,
    audit: AuditLog,
    config: StickyConfig,
    channels: Mutex<HashMap<u64, ChannelEntry>>,
}

impl StickyManager {
    pub fn new(
        store: Arc<CheckpointStore>,
        platform: Arc<dyn ChatPlatform>,
        audit: AuditLog,
        config: StickyConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            platform,
            audit,
            config,
            channels: Mutex::new(HashMap::new()),
        })
    }

    /// Loads persisted stickies and reposts each one so it is last in its
    /// channel again. Returns the number of channels restored.
    pub async fn restore(self: &Arc<Self>) -> Result<usize, StorageError> {
        let records = self.store.load_stickies()?;
        let mut restored = 0;
        for record in records {
            {
                let mut channels = self.channels_lock();
                channels.insert(
                    record.channel_id,
                    ChannelEntry {
                        content: StickyContent::from_record(&record),
                        message_id: MessageId(record.message_id),
                        repost_lock: Arc::new(tokio::sync::Mutex::new(())),
                        pending: None,
                    },
                );
            }
            let channel = ChannelId(record.channel_id);
            match self.repost(channel).await {
                Ok(()) => restored += 1,
                Err(error) => {
                    tracing::warn!(channel = %channel, error = %error, "sticky restore failed");
                }
            }
        }
        Ok(restored)
    }

    /// Activates (or replaces) the sticky for a channel.
    pub async fn set_sticky(
        self: &Arc<Self>,
        channel: ChannelId,
        content: StickyContent,
    ) -> Result<MessageId> {
        let previous = {
            let mut channels = self.channels_lock();
            channels.remove(&channel.0)
        };
        if let Some(mut entry) = previous {
            if let Some(pending) = entry.pending.take() {
                pending.abort();
            }
            self.delete_tolerant(channel, entry.message_id).await;
        }

        let message_id = self
            .post_with_retry(&content.to_outbound(channel))
            .await
            .context("failed to post sticky message")?;
        self.persist(channel, &content, message_id)?;
        {
            let mut channels = self.channels_lock();
            channels.insert(
                channel.0,
                ChannelEntry {
                    content,
                    message_id,
                    repost_lock: Arc::new(tokio::sync::Mutex::new(())),
                    pending: None,
                },
            );
        }
        self.append_audit("sticky_set", channel, AuditOutcome::Succeeded);
        Ok(message_id)
    }

    /// Deactivates a channel's sticky. Returns false when none was active.
    pub async fn remove_sticky(self: &Arc<Self>, channel: ChannelId) -> Result<bool> {
        let entry = {
            let mut channels = self.channels_lock();
            channels.remove(&channel.0)
        };
        let Some(mut entry) = entry else {
            return Ok(false);
        };
        if let Some(pending) = entry.pending.take() {
            pending.abort();
        }
        self.delete_tolerant(channel, entry.message_id).await;
        self.store.delete_sticky(channel.0)?;
        self.append_audit("sticky_removed", channel, AuditOutcome::Succeeded);
        Ok(true)
    }

    /// Reacts to a message arriving in a channel. Messages authored by the
    /// bot itself (including the sticky repost) never trigger a repost.
    pub fn handle_message(self: &Arc<Self>, channel: ChannelId, author_is_self: bool) {
        if author_is_self {
            return;
        }
        let mut channels = self.channels_lock();
        let Some(entry) = channels.get_mut(&channel.0) else {
            return;
        };
        if let Some(pending) = &entry.pending {
            if !pending.is_finished() {
                // A repost is already scheduled; this message coalesces.
                return;
            }
        }
        let manager = Arc::clone(self);
        let debounce = self.config.debounce;
        entry.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            manager.finish_pending_repost(channel).await;
        }));
    }

    /// Reacts to a message deletion. If the deleted message was the live
    /// sticky, reposts immediately and stays active.
    pub async fn handle_message_deleted(
        self: &Arc<Self>,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<()> {
        let was_sticky = {
            let mut channels = self.channels_lock();
            match channels.get_mut(&channel.0) {
                Some(entry) if entry.message_id == message => {
                    if let Some(pending) = entry.pending.take() {
                        pending.abort();
                    }
                    true
                }
                _ => false,
            }
        };
        if !was_sticky {
            return Ok(());
        }
        self.repost(channel).await
    }

    /// Channels with an active sticky, for status reporting.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        let channels = self.channels_lock();
        let mut ids: Vec<u64> = channels.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(ChannelId).collect()
    }

    async fn finish_pending_repost(self: Arc<Self>, channel: ChannelId) {
        {
            let mut channels = self.channels_lock();
            if let Some(entry) = channels.get_mut(&channel.0) {
                entry.pending = None;
            }
        }
        if let Err(error) = self.repost(channel).await {
            tracing::warn!(channel = %channel, error = %error, "sticky repost failed");
            self.append_audit("sticky_repost", channel, AuditOutcome::Failed);
        }
    }

    /// Delete-then-create repost. Serialized per channel so overlapping
    /// triggers cannot leave two live stickies.
    async fn repost(self: &Arc<Self>, channel: ChannelId) -> Result<()> {
        let repost_lock = {
            let channels = self.channels_lock();
            match channels.get(&channel.0) {
                Some(entry) => Arc::clone(&entry.repost_lock),
                None => return Ok(()),
            }
        };
        let _guard = repost_lock.lock().await;

        // Re-read under the lock: a concurrent repost may have replaced the
        // message id, and remove_sticky may have deactivated the channel.
        let (content, old_message) = {
            let channels = self.channels_lock();
            match channels.get(&channel.0) {
                Some(entry) => (entry.content.clone(), entry.message_id),
                None => return Ok(()),
            }
        };

        self.delete_tolerant(channel, old_message).await;
        let new_message = self
            .post_with_retry(&content.to_outbound(channel))
            .await
            .context("failed to repost sticky message")?;

        {
            let mut channels = self.channels_lock();
            if let Some(entry) = channels.get_mut(&channel.0) {
                entry.message_id = new_message;
            }
        }
        self.persist(channel, &content, new_message)?;
        self.append_audit("sticky_repost", channel, AuditOutcome::Succeeded);
        Ok(())
    }

    /// Deletes the old sticky post. "Already gone" is success; any other
    /// failure gets one retry, then the repost proceeds regardless so the
    /// channel is never left without a sticky.
    async fn delete_tolerant(&self, channel: ChannelId, message: MessageId) {
        let mut attempt = 0;
        loop {
            match self.platform.delete_message(channel, message).await {
                Ok(()) => return,
                Err(error) if error.is_not_found() => return,
                Err(error) if error.is_retryable() && attempt < self.config.action_retry_limit => {
                    attempt += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        channel = %channel,
                        message = %message,
                        reason = error.reason_code(),
                        "old sticky delete failed; continuing with repost"
                    );
                    return;
                }
            }
        }
    }

    async fn post_with_retry(&self, message: &OutboundMessage) -> Result<MessageId, ActionError> {
        let mut attempt = 0;
        loop {
            match self.platform.post_message(message).await {
                Ok(id) => return Ok(id),
                Err(error) if error.is_retryable() && attempt < self.config.action_retry_limit => {
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn persist(
        &self,
        channel: ChannelId,
        content: &StickyContent,
        message_id: MessageId,
    ) -> Result<(), StorageError> {
        self.store.upsert_sticky(&StickyRecord {
            channel_id: channel.0,
            message_id: message_id.0,
            content: content.body().to_string(),
            format: content.format_tag().to_string(),
            color: content.color(),
        })
    }

    fn channels_lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ChannelEntry>> {
        self.channels.lock().expect("sticky channel map poisoned")
    }

    fn append_audit(&self, kind: &str, channel: ChannelId, outcome: AuditOutcome) {
        let event = AuditEvent::new(kind, format!("channel:{channel}"), outcome);
        if let Err(error) = self.audit.append(&event) {
            tracing::warn!(error = %error, "audit append failed");
        }
    }
}

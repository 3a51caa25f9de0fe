//! In-memory `ChatPlatform` double for crate and integration tests.
//!
//! Records every call, tracks which messages are currently live per
//! channel, and supports queueing one-shot failures per method so retry
//! paths can be exercised deterministically.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    ActionError, ChannelId, ChatPlatform, MessageId, OutboundMessage, RoleId, ScheduledEventId,
    ScheduledEventSpec, ThreadSpec, ThreadSummary, UserId,
};

#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub id: MessageId,
    pub message: OutboundMessage,
}

#[derive(Default)]
struct RecordingState {
    posted: Vec<PostedMessage>,
    live: BTreeMap<u64, Vec<u64>>,
    deleted: Vec<(ChannelId, MessageId)>,
    threads: Vec<ThreadSummary>,
    event_names: Vec<String>,
    grants: Vec<(UserId, RoleId)>,
    failures: HashMap<&'static str, VecDeque<ActionError>>,
}

#[derive(Default)]
pub struct RecordingPlatform {
    next_id: AtomicU64,
    state: Mutex<RecordingState>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            state: Mutex::new(RecordingState::default()),
        }
    }

    /// Queues an error returned by the next call to `method`; queued errors
    /// drain in FIFO order, after which calls succeed again.
    pub fn fail_next(&self, method: &'static str, error: ActionError) {
        let mut state = self.state.lock().expect("recording state");
        state.failures.entry(method).or_default().push_back(error);
    }

    pub fn seed_thread(&self, summary: ThreadSummary) {
        self.state.lock().expect("recording state").threads.push(summary);
    }

    pub fn seed_event_name(&self, name: impl Into<String>) {
        self.state
            .lock()
            .expect("recording state")
            .event_names
            .push(name.into());
    }

    pub fn posted_messages(&self) -> Vec<PostedMessage> {
        self.state.lock().expect("recording state").posted.clone()
    }

    /// Message ids currently live in a channel, in creation order.
    pub fn live_messages(&self, channel: ChannelId) -> Vec<MessageId> {
        self.state
            .lock()
            .expect("recording state")
            .live
            .get(&channel.0)
            .map(|ids| ids.iter().copied().map(MessageId).collect())
            .unwrap_or_default()
    }

    pub fn deleted_messages(&self) -> Vec<(ChannelId, MessageId)> {
        self.state.lock().expect("recording state").deleted.clone()
    }

    pub fn threads(&self) -> Vec<ThreadSummary> {
        self.state.lock().expect("recording state").threads.clone()
    }

    pub fn scheduled_event_names(&self) -> Vec<String> {
        self.state.lock().expect("recording state").event_names.clone()
    }

    pub fn granted_roles(&self) -> Vec<(UserId, RoleId)> {
        self.state.lock().expect("recording state").grants.clone()
    }

    fn take_failure(&self, method: &'static str) -> Result<(), ActionError> {
        let mut state = self.state.lock().expect("recording state");
        if let Some(queue) = state.failures.get_mut(method) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn post_message(&self, message: &OutboundMessage) -> Result<MessageId, ActionError> {
        self.take_failure("post_message")?;
        let id = self.allocate_id();
        let mut state = self.state.lock().expect("recording state");
        state.posted.push(PostedMessage {
            id: MessageId(id),
            message: message.clone(),
        });
        state.live.entry(message.channel.0).or_default().push(id);
        Ok(MessageId(id))
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), ActionError> {
        self.take_failure("delete_message")?;
        let mut state = self.state.lock().expect("recording state");
        let Some(ids) = state.live.get_mut(&channel.0) else {
            return Err(ActionError::NotFound);
        };
        let Some(position) = ids.iter().position(|id| *id == message.0) else {
            return Err(ActionError::NotFound);
        };
        ids.remove(position);
        state.deleted.push((channel, message));
        Ok(())
    }

    async fn create_thread(&self, spec: &ThreadSpec) -> Result<ChannelId, ActionError> {
        self.take_failure("create_thread")?;
        let id = self.allocate_id();
        let mut state = self.state.lock().expect("recording state");
        state.threads.push(ThreadSummary {
            id: ChannelId(id),
            title: spec.title.clone(),
            message: spec.message.clone(),
        });
        Ok(ChannelId(id))
    }

    async fn list_threads(&self, _channel: ChannelId) -> Result<Vec<ThreadSummary>, ActionError> {
        self.take_failure("list_threads")?;
        Ok(self.threads())
    }

    async fn create_scheduled_event(
        &self,
        spec: &ScheduledEventSpec,
    ) -> Result<ScheduledEventId, ActionError> {
        self.take_failure("create_scheduled_event")?;
        let id = self.allocate_id();
        let mut state = self.state.lock().expect("recording state");
        state.event_names.push(spec.name.clone());
        Ok(ScheduledEventId(id))
    }

    async fn list_scheduled_event_names(&self) -> Result<Vec<String>, ActionError> {
        self.take_failure("list_scheduled_event_names")?;
        Ok(self.scheduled_event_names())
    }

    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<(), ActionError> {
        self.take_failure("grant_role")?;
        let mut state = self.state.lock().expect("recording state");
        state.grants.push((user, role));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unit_recording_platform_tracks_live_messages_and_not_found() {
        let platform = RecordingPlatform::new();
        let channel = ChannelId(1);

        let first = platform
            .post_message(&OutboundMessage::text(channel, "a"))
            .await
            .expect("post a");
        let second = platform
            .post_message(&OutboundMessage::text(channel, "b"))
            .await
            .expect("post b");
        assert_eq!(platform.live_messages(channel), vec![first, second]);

        platform.delete_message(channel, first).await.expect("delete");
        assert_eq!(platform.live_messages(channel), vec![second]);

        let error = platform
            .delete_message(channel, first)
            .await
            .expect_err("double delete");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn unit_queued_failures_drain_in_order() {
        let platform = RecordingPlatform::new();
        platform.fail_next(
            "post_message",
            ActionError::retryable("delivery_rate_limited", "429"),
        );

        let error = platform
            .post_message(&OutboundMessage::text(ChannelId(1), "x"))
            .await
            .expect_err("queued failure");
        assert!(error.is_retryable());

        platform
            .post_message(&OutboundMessage::text(ChannelId(1), "x"))
            .await
            .expect("subsequent call succeeds");
    }
}

//! Autorole milestone counter: the first N members to join get a special
//! role and a milestone embed.
//!
//! The increment and the threshold check are one atomic step on the
//! serialized checkpoint store, so two members joining at the same moment
//! can never both claim the final slot. A claimed slot is never rolled
//! back; the counter is monotonically non-decreasing.

use std::sync::Arc;

use anyhow::Result;

use encore_core::{current_unix_timestamp, AuditEvent, AuditLog, AuditOutcome};
use encore_platform::{
    ActionError, ChannelId, ChatPlatform, EmbedSpec, MemberJoined, OutboundMessage, RoleId,
};
use encore_store::CheckpointStore;

pub const DEFAULT_THRESHOLD: u64 = 1_000;
const MILESTONE_EMBED_TITLE: &str = "\u{1f525} You Made It!";
const MILESTONE_EMBED_COLOR: u32 = 0x2ECC71;

#[derive(Debug, Clone)]
pub struct MilestoneConfig {
    /// Role granted to each of the first `threshold` members.
    pub role: RoleId,
    /// Channel the milestone embed is posted to, when configured.
    pub welcome_channel: Option<ChannelId>,
    pub threshold: u64,
    pub action_retry_limit: usize,
}

impl MilestoneConfig {
    pub fn new(role: RoleId) -> Self {
        Self {
            role,
            welcome_channel: None,
            threshold: DEFAULT_THRESHOLD,
            action_retry_limit: 1,
        }
    }
}

pub struct MilestoneCounter {
    store: Arc<CheckpointStore>,
    platform: Arc<dyn ChatPlatform>,
    audit: AuditLog,
    config: MilestoneConfig,
}

impl MilestoneCounter {
    pub fn new(
        store: Arc<CheckpointStore>,
        platform: Arc<dyn ChatPlatform>,
        audit: AuditLog,
        config: MilestoneConfig,
    ) -> Self {
        Self {
            store,
            platform,
            audit,
            config,
        }
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.store.milestone_count()?)
    }

    /// Handles one member join. Returns the member's claimed position when
    /// they were granted the role, `None` when the cap is reached, the
    /// member is a bot account, or the grant could not be delivered.
    pub async fn handle_member_join(&self, member: &MemberJoined) -> Result<Option<u64>> {
        if member.is_bot {
            tracing::debug!(user = %member.user, "bot account skipped for milestone role");
            return Ok(None);
        }

        let Some(position) = self.store.claim_milestone_slot(self.config.threshold)? else {
            tracing::debug!(user = %member.user, "milestone cap reached; no role granted");
            return Ok(None);
        };

        if let Err(error) = self.grant_with_retry(member).await {
            // The slot stays claimed: the counter never moves backwards,
            // and a re-join will claim a fresh slot if any remain.
            tracing::warn!(
                user = %member.user,
                position,
                reason = error.reason_code(),
                error = %error,
                "milestone role grant failed"
            );
            self.append_audit(member, AuditOutcome::Failed);
            return Ok(None);
        }
        self.append_audit(member, AuditOutcome::Succeeded);
        tracing::info!(user = %member.user, position, "milestone role granted");

        if let Some(channel) = self.config.welcome_channel {
            if let Err(error) = self
                .platform
                .post_message(&self.milestone_message(channel, member, position))
                .await
            {
                tracing::warn!(
                    user = %member.user,
                    reason = error.reason_code(),
                    "milestone embed post failed"
                );
            }
        }
        Ok(Some(position))
    }

    async fn grant_with_retry(&self, member: &MemberJoined) -> Result<(), ActionError> {
        let mut attempt = 0;
        loop {
            match self.platform.grant_role(member.user, self.config.role).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt < self.config.action_retry_limit => {
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn milestone_message(
        &self,
        channel: ChannelId,
        member: &MemberJoined,
        position: u64,
    ) -> OutboundMessage {
        let embed = EmbedSpec {
            title: Some(MILESTONE_EMBED_TITLE.to_string()),
            description: format!(
                "You're member **{position} of {}** to join the chaos.\n\n\
                 One of our first {} voices, thank you for being part of the \
                 noise. Let's make some magic together. \u{1f5a4}",
                self.config.threshold, self.config.threshold
            ),
            color: Some(MILESTONE_EMBED_COLOR),
            author_name: Some(member.display_name.clone()),
            author_icon_url: member.avatar_url.clone(),
            timestamp_unix: Some(current_unix_timestamp() as i64),
            ..EmbedSpec::default()
        };
        OutboundMessage::embed(channel, embed)
            .with_content(format!("Welcome, <@{}>!", member.user))
    }

    fn append_audit(&self, member: &MemberJoined, outcome: AuditOutcome) {
        let event = AuditEvent::new(
            "milestone_role_granted",
            format!("user:{}", member.user),
            outcome,
        );
        if let Err(error) = self.audit.append(&event) {
            tracing::warn!(error = %error, "audit append failed");
        }
    }
}

//! Slash-command handlers. Command registration and interaction UI belong
//! to the hosting integration; each handler here returns one
//! human-readable reply for it to render.

use std::sync::Arc;
use std::time::{Duration, Instant};

use encore_platform::ChannelId;
use encore_reconcile::ReconcileEngine;
use encore_shows::ShowSync;
use encore_sticky::{StickyContent, StickyManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One user-visible reply; internal detail stays in the logs.
pub struct CommandReply {
    pub title: String,
    pub message: String,
    pub kind: ReplyKind,
}

impl CommandReply {
    fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind: ReplyKind::Success,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
            kind: ReplyKind::Error,
        }
    }

    fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind: ReplyKind::Info,
        }
    }
}

pub struct Commands {
    sticky: Arc<StickyManager>,
    engine: Arc<ReconcileEngine>,
    shows: Arc<ShowSync>,
    started_at: Instant,
}

impl Commands {
    pub fn new(
        sticky: Arc<StickyManager>,
        engine: Arc<ReconcileEngine>,
        shows: Arc<ShowSync>,
    ) -> Self {
        Self {
            sticky,
            engine,
            shows,
            started_at: Instant::now(),
        }
    }

    pub async fn set_sticky(&self, channel: ChannelId, content: StickyContent) -> CommandReply {
        match self.sticky.set_sticky(channel, content).await {
            Ok(_) => CommandReply::success(
                "Sticky Set",
                format!("Sticky successfully set in <#{channel}>."),
            ),
            Err(error) => {
                tracing::warn!(channel = %channel, error = %error, "set sticky failed");
                CommandReply::error(format!("Could not set the sticky in <#{channel}>."))
            }
        }
    }

    pub async fn remove_sticky(&self, channel: ChannelId) -> CommandReply {
        match self.sticky.remove_sticky(channel).await {
            Ok(true) => CommandReply::success(
                "Sticky Removed",
                format!("Removed sticky from <#{channel}>."),
            ),
            Ok(false) => CommandReply::error(format!("No sticky found in <#{channel}>.")),
            Err(error) => {
                tracing::warn!(channel = %channel, error = %error, "remove sticky failed");
                CommandReply::error(format!("Could not remove the sticky from <#{channel}>."))
            }
        }
    }

    /// Runs one show reconciliation cycle immediately, bypassing the timer.
    pub async fn scrape_now(&self) -> CommandReply {
        match self.engine.run_cycle(self.shows.as_ref()).await {
            Ok(report) if report.fetch_failed => {
                CommandReply::error("Could not fetch the tour page. Try again later.")
            }
            Ok(report) if report.is_idle() => CommandReply::info(
                "Scrape Completed",
                "All up to date! No new threads or scheduled events created.",
            ),
            Ok(report) => {
                let mut message = format!(
                    "**Shows synchronized:** {} new show{} with a thread and scheduled event.",
                    report.applied,
                    if report.applied == 1 { "" } else { "s" }
                );
                if report.failed > 0 {
                    message.push_str(&format!(
                        "\n{} show{} could not be synchronized and will be retried.",
                        report.failed,
                        if report.failed == 1 { "" } else { "s" }
                    ));
                }
                CommandReply::success("Scrape Completed", message)
            }
            Err(error) => {
                tracing::warn!(error = %error, "manual scrape failed on storage");
                CommandReply::error("An error occurred during scraping. Try again later.")
            }
        }
    }

    pub fn uptime(&self) -> CommandReply {
        let formatted = format_uptime(self.started_at.elapsed());
        CommandReply::info(
            "Bot Uptime",
            format!("The bot has been running for: `{formatted}`"),
        )
    }

    pub fn help(&self) -> CommandReply {
        CommandReply::info(
            "Commands",
            "`/setsticky` - set a sticky message in this channel\n\
             `/removesticky` - remove this channel's sticky message\n\
             `/scrape` - check the tour page for new shows now\n\
             `/uptime` - how long the bot has been running\n\
             `/help` - this list",
        )
    }
}

/// `1d 2h 3m 4s` formatting.
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days}d {hours}h {minutes}m {seconds}s")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono_tz::Europe::London;
    use encore_core::AuditLog;
    use encore_feeds::{ShowDate, ShowSource};
    use encore_platform::testing::RecordingPlatform;
    use encore_platform::{ChatPlatform, FetchError};
    use encore_shows::ShowSyncConfig;
    use encore_sticky::StickyConfig;
    use encore_store::CheckpointStore;

    use super::*;

    struct StaticShows(Result<Vec<ShowDate>, FetchError>);

    #[async_trait]
    impl ShowSource for StaticShows {
        async fn fetch(&self) -> Result<Vec<ShowDate>, FetchError> {
            self.0.clone()
        }
    }

    fn commands_with(
        platform: Arc<RecordingPlatform>,
        shows: Result<Vec<ShowDate>, FetchError>,
        temp: &tempfile::TempDir,
    ) -> Commands {
        let store = Arc::new(CheckpointStore::in_memory().expect("store"));
        let audit = AuditLog::new(temp.path().join("audit.jsonl"));
        let sticky = StickyManager::new(
            Arc::clone(&store),
            Arc::clone(&platform) as Arc<dyn ChatPlatform>,
            audit.clone(),
            StickyConfig::default(),
        );
        let engine = Arc::new(ReconcileEngine::new(Arc::clone(&store), audit));
        let show_sync = Arc::new(ShowSync::new(
            Arc::new(StaticShows(shows)),
            Arc::clone(&platform) as Arc<dyn ChatPlatform>,
            ShowSyncConfig::new(ChannelId(42), London, "Sigrid"),
        ));
        Commands::new(sticky, engine, show_sync)
    }

    fn oslo_show() -> ShowDate {
        ShowDate {
            date: "06 June 2025".to_string(),
            venue: "Oslo Spektrum".to_string(),
            location: "Oslo, Norway".to_string(),
            url: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn functional_scrape_reports_synchronized_shows_then_idle() {
        let platform = Arc::new(RecordingPlatform::new());
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = commands_with(Arc::clone(&platform), Ok(vec![oslo_show()]), &temp);

        let reply = commands.scrape_now().await;
        assert_eq!(reply.kind, ReplyKind::Success);
        assert!(reply.message.contains("1 new show"));

        let reply = commands.scrape_now().await;
        assert_eq!(reply.kind, ReplyKind::Info);
        assert!(reply.message.contains("All up to date!"));
    }

    #[tokio::test]
    async fn unit_scrape_reports_fetch_failure_as_single_message() {
        let platform = Arc::new(RecordingPlatform::new());
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = commands_with(
            platform,
            Err(FetchError::Timeout { timeout_ms: 10 }),
            &temp,
        );

        let reply = commands.scrape_now().await;
        assert_eq!(reply.kind, ReplyKind::Error);
        assert!(reply.message.contains("tour page"));
    }

    #[tokio::test]
    async fn functional_sticky_commands_round_trip() {
        let platform = Arc::new(RecordingPlatform::new());
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = commands_with(Arc::clone(&platform), Ok(Vec::new()), &temp);
        let channel = ChannelId(7);

        let reply = commands.remove_sticky(channel).await;
        assert_eq!(reply.kind, ReplyKind::Error);
        assert!(reply.message.contains("No sticky found"));

        let reply = commands
            .set_sticky(channel, StickyContent::Text("rules".to_string()))
            .await;
        assert_eq!(reply.kind, ReplyKind::Success);
        assert_eq!(platform.live_messages(channel).len(), 1);

        let reply = commands.remove_sticky(channel).await;
        assert_eq!(reply.kind, ReplyKind::Success);
        assert!(platform.live_messages(channel).is_empty());
    }

    #[test]
    fn unit_format_uptime_splits_days_hours_minutes_seconds() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 0h 0m 0s");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3_600 * 2 + 60 * 3 + 4)),
            "1d 2h 3m 4s"
        );
    }

    #[tokio::test]
    async fn unit_uptime_and_help_replies_are_informational() {
        let platform = Arc::new(RecordingPlatform::new());
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = commands_with(platform, Ok(Vec::new()), &temp);

        let uptime = commands.uptime();
        assert_eq!(uptime.kind, ReplyKind::Info);
        assert!(uptime.message.contains("running for"));

        let help = commands.help();
        assert!(help.message.contains("/scrape"));
        assert!(help.message.contains("/setsticky"));
    }
}

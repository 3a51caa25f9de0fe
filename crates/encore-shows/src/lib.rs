//! Show/event synchronizer: maps newly observed tour dates to a forum
//! thread plus a scheduled calendar event.
//!
//! Identity is the normalized `(date, venue)` pair. Both sub-actions must
//! succeed within one `act` call before the reconciliation engine
//! checkpoints the identity; a partial success leaves the show "new" and
//! it is retried next cycle. Each sub-action first checks for an existing
//! thread/event with the same normalized name, which is what bounds
//! duplicate risk while retrying.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;

use encore_feeds::showdates::event_window;
use encore_feeds::{normalize_identity, ShowDate, ShowSource};
use encore_platform::{
    ActionError, ChannelId, ChatPlatform, FetchError, ScheduledEventSpec, ThreadSpec,
};
use encore_reconcile::{ActionReceipt, ReconcileFeature};
use encore_store::SCOPE_SHOWS_SEEN;

const DEFAULT_AUTO_ARCHIVE_MINUTES: u32 = 60;

#[derive(Debug, Clone)]
pub struct ShowSyncConfig {
    /// Forum channel that holds one discussion thread per show.
    pub forum_channel: ChannelId,
    /// Timezone the tour page's dates are anchored in.
    pub timezone: Tz,
    /// Artist name used in thread starters and event descriptions.
    pub artist: String,
    pub auto_archive_minutes: u32,
}

impl ShowSyncConfig {
    pub fn new(forum_channel: ChannelId, timezone: Tz, artist: impl Into<String>) -> Self {
        Self {
            forum_channel,
            timezone,
            artist: artist.into(),
            auto_archive_minutes: DEFAULT_AUTO_ARCHIVE_MINUTES,
        }
    }
}

/// `ReconcileFeature` instance for tour dates.
pub struct ShowSync {
    source: Arc<dyn ShowSource>,
    platform: Arc<dyn ChatPlatform>,
    config: ShowSyncConfig,
}

impl ShowSync {
    pub fn new(
        source: Arc<dyn ShowSource>,
        platform: Arc<dyn ChatPlatform>,
        config: ShowSyncConfig,
    ) -> Self {
        Self {
            source,
            platform,
            config,
        }
    }

    fn venue_line(&self, show: &ShowDate) -> String {
        if show.location.is_empty() {
            format!("{} at {}", self.config.artist, show.venue)
        } else {
            format!("{} at {}, {}", self.config.artist, show.venue, show.location)
        }
    }

    fn starter_message(&self, show: &ShowDate) -> String {
        let mut lines = vec![self.venue_line(show)];
        if let Some(url) = &show.url {
            lines.push(format!("Tickets: {url}"));
        }
        if let Some(image_url) = &show.image_url {
            lines.push(image_url.clone());
        }
        lines.join("\n")
    }

    fn event_name(&self, show: &ShowDate) -> String {
        if show.venue.is_empty() {
            show.date.clone()
        } else {
            format!("{} - {}", show.date, show.venue)
        }
    }

    async fn ensure_thread(&self, show: &ShowDate) -> Result<bool, ActionError> {
        let wanted_title = normalize_identity(&show.date);
        let wanted_location = normalize_identity(&show.location);
        let threads = self.platform.list_threads(self.config.forum_channel).await?;
        let exists = threads.iter().any(|thread| {
            normalize_identity(&thread.title) == wanted_title
                && (wanted_location.is_empty()
                    || normalize_identity(&thread.message).contains(&wanted_location))
        });
        if exists {
            tracing::debug!(date = show.date.as_str(), "thread already exists");
            return Ok(false);
        }
        self.platform
            .create_thread(&ThreadSpec {
                channel: self.config.forum_channel,
                title: show.date.clone(),
                message: self.starter_message(show),
                auto_archive_minutes: self.config.auto_archive_minutes,
            })
            .await?;
        Ok(true)
    }

    async fn ensure_event(&self, show: &ShowDate) -> Result<bool, ActionError> {
        let event_name = self.event_name(show);
        let wanted = normalize_identity(&event_name);
        let existing = self.platform.list_scheduled_event_names().await?;
        if existing
            .iter()
            .any(|name| normalize_identity(name) == wanted)
        {
            tracing::debug!(event = event_name.as_str(), "scheduled event already exists");
            return Ok(false);
        }

        let (start, end) = event_window(&show.date, self.config.timezone);
        let location = if show.location.is_empty() {
            show.venue.clone()
        } else {
            format!("{}, {}", show.venue, show.location)
        };
        self.platform
            .create_scheduled_event(&ScheduledEventSpec {
                name: event_name,
                description: self.venue_line(show),
                location,
                start_unix: start.timestamp(),
                end_unix: end.timestamp(),
            })
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl ReconcileFeature for ShowSync {
    type Item = ShowDate;

    fn name(&self) -> &'static str {
        "shows"
    }

    fn scope(&self) -> &'static str {
        SCOPE_SHOWS_SEEN
    }

    async fn observe(&self) -> Result<Vec<ShowDate>, FetchError> {
        self.source.fetch().await
    }

    fn identity(&self, show: &ShowDate) -> String {
        show.identity()
    }

    fn checkpoint_key(&self, show: &ShowDate) -> String {
        show.identity()
    }

    /// Thread first, then event. Any failure propagates so the identity is
    /// not checkpointed and the whole pair is retried next cycle.
    async fn act(&self, show: &ShowDate) -> Result<ActionReceipt, ActionError> {
        let thread_created = self.ensure_thread(show).await?;
        let event_created = self.ensure_event(show).await?;
        tracing::info!(
            date = show.date.as_str(),
            venue = show.venue.as_str(),
            thread_created,
            event_created,
            "show synchronized"
        );
        Ok(ActionReceipt {
            kind: "show_synchronized",
            target: show.identity(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono_tz::Europe::London;
    use encore_platform::testing::RecordingPlatform;
    use encore_platform::ThreadSummary;

    use super::*;

    struct StaticShows(Vec<ShowDate>);

    #[async_trait]
    impl ShowSource for StaticShows {
        async fn fetch(&self) -> Result<Vec<ShowDate>, FetchError> {
            Ok(self.0.clone())
        }
    }

    fn oslo_show() -> ShowDate {
        ShowDate {
            date: "06 June 2025".to_string(),
            venue: "Oslo Spektrum".to_string(),
            location: "Oslo, Norway".to_string(),
            url: Some("https://tickets.example/oslo".to_string()),
            image_url: None,
        }
    }

    fn sync_with(platform: Arc<RecordingPlatform>, shows: Vec<ShowDate>) -> ShowSync {
        ShowSync::new(
            Arc::new(StaticShows(shows)),
            platform,
            ShowSyncConfig::new(ChannelId(42), London, "Sigrid"),
        )
    }

    #[tokio::test]
    async fn functional_act_creates_thread_and_event_for_new_show() {
        let platform = Arc::new(RecordingPlatform::new());
        let sync = sync_with(Arc::clone(&platform), vec![oslo_show()]);

        let receipt = sync.act(&oslo_show()).await.expect("act");
        assert_eq!(receipt.kind, "show_synchronized");

        let threads = platform.threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].title, "06 June 2025");
        assert!(threads[0].message.contains("Sigrid at Oslo Spektrum, Oslo, Norway"));
        assert!(threads[0].message.contains("https://tickets.example/oslo"));

        let events = platform.scheduled_event_names();
        assert_eq!(events, vec!["06 June 2025 - Oslo Spektrum".to_string()]);
    }

    #[tokio::test]
    async fn unit_existing_thread_and_event_are_not_duplicated() {
        let platform = Arc::new(RecordingPlatform::new());
        platform.seed_thread(ThreadSummary {
            id: ChannelId(10),
            title: "06 JUNE 2025".to_string(),
            message: "Sigrid at Oslo Spektrum, Oslo, Norway".to_string(),
        });
        platform.seed_event_name("06 June 2025 - Oslo Spektrum!");

        let sync = sync_with(Arc::clone(&platform), vec![oslo_show()]);
        sync.act(&oslo_show()).await.expect("act");

        assert_eq!(platform.threads().len(), 1);
        assert_eq!(platform.scheduled_event_names().len(), 1);
    }

    #[tokio::test]
    async fn regression_partial_failure_retries_only_missing_half() {
        let platform = Arc::new(RecordingPlatform::new());
        platform.fail_next(
            "create_scheduled_event",
            ActionError::terminal("delivery_rejected", "403"),
        );

        let sync = sync_with(Arc::clone(&platform), vec![oslo_show()]);
        sync.act(&oslo_show()).await.expect_err("event half fails");
        assert_eq!(platform.threads().len(), 1);
        assert!(platform.scheduled_event_names().is_empty());

        // Retry: the thread exists and is skipped; only the event is created.
        sync.act(&oslo_show()).await.expect("act retries cleanly");
        assert_eq!(platform.threads().len(), 1);
        assert_eq!(platform.scheduled_event_names().len(), 1);
    }

    #[tokio::test]
    async fn functional_same_date_different_venue_gets_its_own_thread() {
        let platform = Arc::new(RecordingPlatform::new());
        let other = ShowDate {
            venue: "Sentrum Scene".to_string(),
            location: "Oslo, Norway".to_string(),
            url: None,
            image_url: None,
            date: "06 June 2025".to_string(),
        };
        let sync = sync_with(Arc::clone(&platform), vec![oslo_show(), other.clone()]);

        sync.act(&oslo_show()).await.expect("first show");
        sync.act(&other).await.expect("second show");
        // Same date and city: the thread is shared, the events stay
        // distinct because the event name carries the venue.
        assert_eq!(platform.threads().len(), 1);
        assert_eq!(platform.scheduled_event_names().len(), 2);
    }
}

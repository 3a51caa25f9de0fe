//! Cross-crate checks for the checkpointing guarantees: at-most-once per
//! identity across cycles and restarts, and crash-safe resumption of a
//! partially applied batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Europe::London;

use encore_core::AuditLog;
use encore_feeds::{InstagramPost, InstagramSource, ShowDate, ShowSource};
use encore_instagram::{InstagramAnnouncer, InstagramAnnouncerConfig};
use encore_platform::testing::RecordingPlatform;
use encore_platform::{ActionError, ChannelId, ChatPlatform, FetchError};
use encore_reconcile::ReconcileEngine;
use encore_shows::{ShowSync, ShowSyncConfig};
use encore_store::CheckpointStore;

struct StaticShows(Vec<ShowDate>);

#[async_trait]
impl ShowSource for StaticShows {
    async fn fetch(&self) -> Result<Vec<ShowDate>, FetchError> {
        Ok(self.0.clone())
    }
}

struct StaticProfile(Vec<InstagramPost>);

#[async_trait]
impl InstagramSource for StaticProfile {
    fn username(&self) -> &str {
        "sigrid"
    }

    async fn fetch(&self) -> Result<Vec<InstagramPost>, FetchError> {
        Ok(self.0.clone())
    }
}

fn show(date: &str, venue: &str) -> ShowDate {
    ShowDate {
        date: date.to_string(),
        venue: venue.to_string(),
        location: "Oslo, Norway".to_string(),
        url: None,
        image_url: None,
    }
}

fn engine_over(store: &Arc<CheckpointStore>, temp: &tempfile::TempDir) -> ReconcileEngine {
    ReconcileEngine::new(
        Arc::clone(store),
        AuditLog::new(temp.path().join("audit.jsonl")),
    )
}

#[tokio::test]
async fn integration_instagram_post_announced_once_across_polls_and_restarts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("encore.db");
    let platform = Arc::new(RecordingPlatform::new());
    let post = InstagramPost {
        post_id: "p123".to_string(),
        caption: "New single!".to_string(),
        image_url: None,
        taken_at_unix: 100,
    };

    {
        let store = Arc::new(CheckpointStore::open(&db_path).expect("store"));
        let engine = engine_over(&store, &temp);
        let announcer = InstagramAnnouncer::new(
            Arc::new(StaticProfile(vec![post.clone()])),
            Arc::clone(&platform) as Arc<dyn ChatPlatform>,
            InstagramAnnouncerConfig {
                announce_channel: ChannelId(77),
                ping_role: None,
            },
        );

        let report = engine.run_cycle(&announcer).await.expect("first poll");
        assert_eq!(report.applied, 1);
        assert_eq!(
            store.get("instagram_last", "sigrid").expect("checkpoint"),
            Some("p123".to_string())
        );

        let report = engine.run_cycle(&announcer).await.expect("second poll");
        assert!(report.is_idle());
    }

    // Process restart: fresh store handle and engine over the same file.
    let store = Arc::new(CheckpointStore::open(&db_path).expect("reopen"));
    let engine = engine_over(&store, &temp);
    let announcer = InstagramAnnouncer::new(
        Arc::new(StaticProfile(vec![post])),
        Arc::clone(&platform) as Arc<dyn ChatPlatform>,
        InstagramAnnouncerConfig {
            announce_channel: ChannelId(77),
            ping_role: None,
        },
    );
    let report = engine.run_cycle(&announcer).await.expect("post-restart poll");
    assert!(report.is_idle());
    assert_eq!(platform.posted_messages().len(), 1);
}

#[tokio::test]
async fn integration_crash_mid_batch_resumes_exactly_the_unfinished_tail() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("encore.db");
    let platform = Arc::new(RecordingPlatform::new());
    let shows = vec![
        show("01 June 2025", "Venue One"),
        show("02 June 2025", "Venue Two"),
        show("03 June 2025", "Venue Three"),
    ];

    let sync = ShowSync::new(
        Arc::new(StaticShows(shows.clone())),
        Arc::clone(&platform) as Arc<dyn ChatPlatform>,
        ShowSyncConfig::new(ChannelId(42), London, "Sigrid"),
    );

    platform.fail_next(
        "create_thread",
        ActionError::terminal("delivery_rejected", "boom"),
    );
    {
        let store = Arc::new(CheckpointStore::open(&db_path).expect("store"));
        let engine = engine_over(&store, &temp);
        // fail_next hits the first create call of the cycle, which belongs
        // to show one; shows two and three then land.
        let report = engine.run_cycle(&sync).await.expect("first cycle");
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.list("shows_seen").expect("list").len(), 2);
    }

    // Restart: only the failed show is still new.
    let store = Arc::new(CheckpointStore::open(&db_path).expect("reopen"));
    let engine = engine_over(&store, &temp);
    let report = engine.run_cycle(&sync).await.expect("resume cycle");
    assert_eq!(report.new_items, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(store.list("shows_seen").expect("list").len(), 3);

    // Exactly one thread and one event per show, no duplicates anywhere.
    assert_eq!(platform.threads().len(), 3);
    assert_eq!(platform.scheduled_event_names().len(), 3);

    let report = engine.run_cycle(&sync).await.expect("steady state");
    assert!(report.is_idle());
}

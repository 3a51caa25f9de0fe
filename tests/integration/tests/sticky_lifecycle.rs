//! End-to-end sticky message lifecycle: the invariant that exactly one
//! sticky instance is live and last in the channel, debounce coalescing,
//! and state survival across a process restart.

use std::sync::Arc;
use std::time::Duration;

use encore_core::AuditLog;
use encore_milestone::{MilestoneConfig, MilestoneCounter};
use encore_platform::testing::RecordingPlatform;
use encore_platform::{ChannelId, ChatPlatform, MemberJoined, OutboundMessage, RoleId, UserId};
use encore_sticky::{StickyConfig, StickyContent, StickyManager};
use encore_store::CheckpointStore;

fn manager_over(
    store: &Arc<CheckpointStore>,
    platform: &Arc<RecordingPlatform>,
    temp: &tempfile::TempDir,
    debounce: Duration,
) -> Arc<StickyManager> {
    StickyManager::new(
        Arc::clone(store),
        Arc::clone(platform) as Arc<dyn ChatPlatform>,
        AuditLog::new(temp.path().join("audit.jsonl")),
        StickyConfig {
            debounce,
            action_retry_limit: 1,
        },
    )
}

#[tokio::test]
async fn integration_two_quick_messages_cause_one_delete_and_one_create() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(CheckpointStore::in_memory().expect("store"));
    let platform = Arc::new(RecordingPlatform::new());
    let manager = manager_over(&store, &platform, &temp, Duration::from_millis(60));
    let channel = ChannelId(42);

    manager
        .set_sticky(channel, StickyContent::Text("rules".to_string()))
        .await
        .expect("set");

    platform
        .post_message(&OutboundMessage::text(channel, "hello"))
        .await
        .expect("first chat message");
    manager.handle_message(channel, false);
    platform
        .post_message(&OutboundMessage::text(channel, "hi again"))
        .await
        .expect("second chat message");
    manager.handle_message(channel, false);

    tokio::time::sleep(Duration::from_millis(250)).await;

    // Initial sticky post + one coalesced repost.
    let sticky_posts: Vec<_> = platform
        .posted_messages()
        .into_iter()
        .filter(|posted| posted.message.content.as_deref() == Some("rules"))
        .collect();
    assert_eq!(sticky_posts.len(), 2);
    assert_eq!(platform.deleted_messages().len(), 1);

    // The sticky is the most recent live message in the channel.
    let live = platform.live_messages(channel);
    let sticky_id = store.load_stickies().expect("load")[0].message_id;
    assert_eq!(live.last().map(|id| id.0), Some(sticky_id));
}

#[tokio::test]
async fn integration_sticky_survives_restart_and_stays_last() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("encore.db");
    let platform = Arc::new(RecordingPlatform::new());
    let channel = ChannelId(42);

    {
        let store = Arc::new(CheckpointStore::open(&db_path).expect("store"));
        let manager = manager_over(&store, &platform, &temp, Duration::from_millis(20));
        manager
            .set_sticky(
                channel,
                StickyContent::Embed {
                    body: "welcome".to_string(),
                    color: Some(0x5865F2),
                },
            )
            .await
            .expect("set");
    }

    // Chatter lands while the process is down.
    platform
        .post_message(&OutboundMessage::text(channel, "overnight chatter"))
        .await
        .expect("chatter");

    let store = Arc::new(CheckpointStore::open(&db_path).expect("reopen"));
    let manager = manager_over(&store, &platform, &temp, Duration::from_millis(20));
    let restored = manager.restore().await.expect("restore");
    assert_eq!(restored, 1);

    let live = platform.live_messages(channel);
    let sticky_id = store.load_stickies().expect("load")[0].message_id;
    assert_eq!(live.last().map(|id| id.0), Some(sticky_id));
    assert_eq!(
        live.iter().filter(|id| id.0 == sticky_id).count(),
        1,
        "exactly one live sticky instance"
    );
}

#[tokio::test]
async fn integration_milestone_counter_survives_restart() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("encore.db");
    let platform = Arc::new(RecordingPlatform::new());

    let config = MilestoneConfig {
        role: RoleId(9),
        welcome_channel: None,
        threshold: 3,
        action_retry_limit: 1,
    };
    {
        let store = Arc::new(CheckpointStore::open(&db_path).expect("store"));
        let counter = MilestoneCounter::new(
            Arc::clone(&store),
            Arc::clone(&platform) as Arc<dyn ChatPlatform>,
            AuditLog::new(temp.path().join("audit.jsonl")),
            config.clone(),
        );
        for id in 0..2 {
            counter
                .handle_member_join(&MemberJoined {
                    user: UserId(id),
                    display_name: format!("member-{id}"),
                    avatar_url: None,
                    is_bot: false,
                })
                .await
                .expect("join");
        }
    }

    let store = Arc::new(CheckpointStore::open(&db_path).expect("reopen"));
    let counter = MilestoneCounter::new(
        Arc::clone(&store),
        Arc::clone(&platform) as Arc<dyn ChatPlatform>,
        AuditLog::new(temp.path().join("audit.jsonl")),
        config,
    );
    assert_eq!(counter.count().expect("count"), 2);

    let position = counter
        .handle_member_join(&MemberJoined {
            user: UserId(10),
            display_name: "member-10".to_string(),
            avatar_url: None,
            is_bot: false,
        })
        .await
        .expect("join");
    assert_eq!(position, Some(3));

    let position = counter
        .handle_member_join(&MemberJoined {
            user: UserId(11),
            display_name: "member-11".to_string(),
            avatar_url: None,
            is_bot: false,
        })
        .await
        .expect("join");
    assert_eq!(position, None, "cap persists across restarts");
    assert_eq!(platform.granted_roles().len(), 3);
}

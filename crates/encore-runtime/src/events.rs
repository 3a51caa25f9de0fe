//! Routes gateway events to the event-driven features.
//!
//! The sticky manager consumes message create/delete, the milestone
//! counter consumes member joins. Per-event failures are logged; the loop
//! only exits on shutdown or when the event source closes.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use encore_milestone::MilestoneCounter;
use encore_platform::PlatformEvent;
use encore_sticky::StickyManager;

pub struct EventRouter {
    sticky: Arc<StickyManager>,
    milestone: Arc<MilestoneCounter>,
}

impl EventRouter {
    pub fn new(sticky: Arc<StickyManager>, milestone: Arc<MilestoneCounter>) -> Self {
        Self { sticky, milestone }
    }

    pub async fn dispatch(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::MessageCreated {
                channel,
                author_is_self,
                ..
            } => {
                self.sticky.handle_message(channel, author_is_self);
            }
            PlatformEvent::MessageDeleted { channel, message } => {
                if let Err(error) = self.sticky.handle_message_deleted(channel, message).await {
                    tracing::warn!(channel = %channel, error = %error, "sticky deletion handling failed");
                }
            }
            PlatformEvent::MemberJoined(member) => {
                if let Err(error) = self.milestone.handle_member_join(&member).await {
                    tracing::warn!(user = %member.user, error = %error, "member join handling failed");
                }
            }
        }
    }

    async fn run(
        self,
        mut events: mpsc::Receiver<PlatformEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
                _ = &mut shutdown => break,
            }
        }
        tracing::debug!("event router stopped");
    }
}

#[derive(Debug)]
pub struct EventRouterHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl EventRouterHandle {
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Spawns the router loop over a gateway event stream.
pub fn spawn_event_router(
    router: EventRouter,
    events: mpsc::Receiver<PlatformEvent>,
) -> Result<EventRouterHandle> {
    let handle = tokio::runtime::Handle::try_current()
        .context("event router requires an active Tokio runtime")?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = handle.spawn(router.run(events, shutdown_rx));
    Ok(EventRouterHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

//! Runtime plumbing: per-feature poll timers, the platform event router,
//! and the slash-command handlers.
//!
//! Every timer and event loop is an independent task behind a handle with
//! an explicit shutdown; a failure inside one feature's tick never touches
//! another feature's schedule.

pub mod commands;
pub mod events;
pub mod scheduler;

pub use commands::{format_uptime, CommandReply, Commands, ReplyKind};
pub use events::{spawn_event_router, EventRouter, EventRouterHandle};
pub use scheduler::{spawn_reconcile_poller, PollerConfig, PollerHandle};

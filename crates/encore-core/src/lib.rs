//! Foundational low-level utilities shared across encore crates.
//!
//! Provides atomic file-write helpers, unix-time utilities, and the
//! append-only audit log the reconciliation features report actions to.

pub mod atomic_io;
pub mod audit;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use audit::{AuditEvent, AuditLog, AuditOutcome};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};

//! Append-only JSONL audit log.
//!
//! Every externally visible action the reconciliation features take is
//! recorded as one structured line: the action kind, the target it touched,
//! and how it turned out. The format is consumed by external tooling; only
//! the field set here is contractual.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::time_utils::current_unix_timestamp_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Terminal result of an audited action.
pub enum AuditOutcome {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One structured audit record; serialized as a single JSONL line.
pub struct AuditEvent {
    pub timestamp_unix_ms: u64,
    pub kind: String,
    pub target: String,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: impl Into<String>, target: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            timestamp_unix_ms: current_unix_timestamp_ms(),
            kind: kind.into(),
            target: target.into(),
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone)]
/// Handle to the audit log file. Cloning shares the destination path.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Appends one event as a JSON line, creating the file and parent
    /// directories on first use.
    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let line = serde_json::to_string(event).context("failed to serialize audit event")?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_audit_log_appends_one_line_per_event() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::new(temp.path().join("logs/audit.jsonl"));

        log.append(&AuditEvent::new(
            "instagram_post_announced",
            "p123",
            AuditOutcome::Succeeded,
        ))
        .expect("append first");
        log.append(
            &AuditEvent::new("sticky_repost", "channel:42", AuditOutcome::Failed)
                .with_detail("delivery_rate_limited"),
        )
        .expect("append second");

        let raw = std::fs::read_to_string(log.path()).expect("read log");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEvent = serde_json::from_str(lines[0]).expect("parse first");
        assert_eq!(first.kind, "instagram_post_announced");
        assert_eq!(first.target, "p123");
        assert_eq!(first.outcome, AuditOutcome::Succeeded);
        assert!(first.detail.is_none());

        let second: AuditEvent = serde_json::from_str(lines[1]).expect("parse second");
        assert_eq!(second.outcome, AuditOutcome::Failed);
        assert_eq!(second.detail.as_deref(), Some("delivery_rate_limited"));
    }
}

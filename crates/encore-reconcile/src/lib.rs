//! Generic reconciliation engine: observe → diff → act → checkpoint.
//!
//! Every polling feature is one `ReconcileFeature` implementation; the
//! engine owns the shared semantics. The load-bearing rule is step 4:
//! each item's identity is checkpointed immediately after its action
//! succeeds, never batched, so a crash mid-batch re-processes only the
//! not-yet-checkpointed tail and a completed action can never fire twice.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use encore_core::{AuditEvent, AuditLog, AuditOutcome};
use encore_platform::{ActionError, FetchError};
use encore_store::{CheckpointStore, StorageError};

const DEFAULT_ACTION_RETRY_LIMIT: usize = 1;

#[derive(Debug, Clone)]
/// What a feature's action did, for the audit log.
pub struct ActionReceipt {
    pub kind: &'static str,
    pub target: String,
}

/// One reconciliation feature: a source of observed items plus the action
/// to take for each item never acted on before.
#[async_trait]
pub trait ReconcileFeature: Send + Sync {
    type Item: Send + Sync;

    fn name(&self) -> &'static str;

    /// Checkpoint scope this feature owns. Scopes are disjoint across
    /// features; the engine never writes outside this one.
    fn scope(&self) -> &'static str;

    /// Current external state, oldest item first. The order is preserved
    /// when acting so announcements appear in chronological order.
    async fn observe(&self) -> Result<Vec<Self::Item>, FetchError>;

    /// Stable identity used to deduplicate items across polls.
    fn identity(&self, item: &Self::Item) -> String;

    /// Checkpoint row key. Features with last-seen semantics return a
    /// constant key (one replaced row); set semantics return the identity.
    fn checkpoint_key(&self, item: &Self::Item) -> String;

    async fn act(&self, item: &Self::Item) -> Result<ActionReceipt, ActionError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Outcome summary of one reconciliation cycle.
pub struct CycleReport {
    pub feature: String,
    pub fetch_failed: bool,
    pub observed: usize,
    pub new_items: usize,
    pub applied: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        !self.fetch_failed && self.new_items == 0
    }
}

/// Shared driver for all reconciliation features.
pub struct ReconcileEngine {
    store: Arc<CheckpointStore>,
    audit: AuditLog,
    action_retry_limit: usize,
}

impl ReconcileEngine {
    pub fn new(store: Arc<CheckpointStore>, audit: AuditLog) -> Self {
        Self {
            store,
            audit,
            action_retry_limit: DEFAULT_ACTION_RETRY_LIMIT,
        }
    }

    pub fn with_action_retry_limit(mut self, action_retry_limit: usize) -> Self {
        self.action_retry_limit = action_retry_limit;
        self
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    /// Runs one fetch-diff-act-persist pass for `feature`.
    ///
    /// A fetch failure skips the cycle (logged, no writes). An action
    /// failure leaves that item unseen for the next cycle and continues
    /// with the rest. A storage failure aborts the cycle so nothing is
    /// recorded as done that was not.
    pub async fn run_cycle<F: ReconcileFeature>(
        &self,
        feature: &F,
    ) -> Result<CycleReport, StorageError> {
        let mut report = CycleReport {
            feature: feature.name().to_string(),
            ..CycleReport::default()
        };

        let observed = match feature.observe().await {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(
                    feature = feature.name(),
                    reason = error.reason_code(),
                    error = %error,
                    "feed fetch failed; skipping cycle"
                );
                report.fetch_failed = true;
                return Ok(report);
            }
        };
        report.observed = observed.len();
        if observed.is_empty() {
            return Ok(report);
        }

        let seen: HashSet<String> = self
            .store
            .list(feature.scope())?
            .into_iter()
            .map(|(_, value)| value)
            .collect();

        let mut handled: HashSet<String> = HashSet::new();
        let new_items: Vec<&F::Item> = observed
            .iter()
            .filter(|item| {
                let identity = feature.identity(item);
                !seen.contains(&identity) && handled.insert(identity)
            })
            .collect();
        report.new_items = new_items.len();
        if new_items.is_empty() {
            tracing::debug!(feature = feature.name(), "cycle idle; nothing new");
            return Ok(report);
        }

        for item in new_items {
            let identity = feature.identity(item);
            match self.act_with_retry(feature, item).await {
                Ok(receipt) => {
                    self.store
                        .set(feature.scope(), &feature.checkpoint_key(item), &identity)?;
                    report.applied += 1;
                    self.append_audit(
                        receipt.kind,
                        &receipt.target,
                        AuditOutcome::Succeeded,
                        None,
                    );
                    tracing::info!(
                        feature = feature.name(),
                        identity = identity.as_str(),
                        "action applied and checkpointed"
                    );
                }
                Err(error) => {
                    report.failed += 1;
                    self.append_audit(
                        feature.name(),
                        &identity,
                        AuditOutcome::Failed,
                        Some(error.reason_code().to_string()),
                    );
                    tracing::warn!(
                        feature = feature.name(),
                        identity = identity.as_str(),
                        reason = error.reason_code(),
                        error = %error,
                        "action failed; item stays unseen for next cycle"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn act_with_retry<F: ReconcileFeature>(
        &self,
        feature: &F,
        item: &F::Item,
    ) -> Result<ActionReceipt, ActionError> {
        let mut attempt = 0;
        loop {
            match feature.act(item).await {
                Ok(receipt) => return Ok(receipt),
                Err(error) if error.is_retryable() && attempt < self.action_retry_limit => {
                    attempt += 1;
                    tracing::debug!(
                        feature = feature.name(),
                        attempt,
                        reason = error.reason_code(),
                        "retrying transient action failure"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn append_audit(
        &self,
        kind: &str,
        target: &str,
        outcome: AuditOutcome,
        detail: Option<String>,
    ) {
        let mut event = AuditEvent::new(kind, target, outcome);
        event.detail = detail;
        if let Err(error) = self.audit.append(&event) {
            tracing::warn!(error = %error, "audit append failed");
        }
    }
}

use std::error::Error;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::action::{ActionKind, CompensatingAction, Diagnostic, Diagnostics};
use crate::audit::{ActionStatus, DrainAuditLog};
use crate::error::{CompensationError, FailureRecord};
use crate::policy::EnvironmentPolicy;
use crate::session::SessionHandle;

/// Ordered record of pending compensations.
///
/// Insertion order is provisioning order. Draining consumes the ledger and
/// runs every action from last-appended to first-appended; a failing action
/// never stops the ones registered before it.
pub struct CleanupLedger<E> {
    actions: Vec<CompensatingAction<E>>,
    keep_persistent: bool,
}

impl<E> CleanupLedger<E> {
    /// An empty ledger that runs every action when drained.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            keep_persistent: false,
        }
    }

    /// An empty ledger honoring the skip-cleanup toggle of `policy`.
    #[must_use]
    pub fn for_policy(policy: &EnvironmentPolicy) -> Self {
        Self {
            actions: Vec::new(),
            keep_persistent: policy.skip_cleanup,
        }
    }

    /// Register a compensation.
    pub fn push(&mut self, action: CompensatingAction<E>) {
        debug!(action = action.label(), kind = %action.kind(), "registered compensation");
        self.actions.push(action);
    }

    /// Register a compensation that undoes external state.
    pub fn defer_persistent<F>(&mut self, label: impl Into<String>, run: F)
    where
        F: FnOnce(&mut Diagnostics) -> Result<(), E> + Send + 'static,
    {
        self.push(CompensatingAction::persistent(label, run));
    }

    /// Register a compensation that releases a local resource.
    pub fn defer_local<F>(&mut self, label: impl Into<String>, run: F)
    where
        F: FnOnce(&mut Diagnostics) -> Result<(), E> + Send + 'static,
    {
        self.push(CompensatingAction::local(label, run));
    }

    /// Move every action of `other` to the end of this ledger, keeping their
    /// relative order.
    pub fn append(&mut self, mut other: CleanupLedger<E>) {
        self.actions.append(&mut other.actions);
    }

    /// Take all pending actions, leaving this ledger empty.
    ///
    /// Used to hand the accumulated compensations to the value a scope
    /// returns.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            actions: std::mem::take(&mut self.actions),
            keep_persistent: self.keep_persistent,
        }
    }

    /// Drop all pending actions without running them.
    ///
    /// Only valid once whatever the actions undo is owned elsewhere, such as
    /// an adopted session that has been handed to the caller.
    pub fn forget(&mut self) -> usize {
        let count = self.actions.len();
        if count > 0 {
            debug!(count, "released pending compensations");
        }
        self.actions.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Labels of pending actions in registration order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(CompensatingAction::label).collect()
    }
}

impl<E> CleanupLedger<E>
where
    E: Error + Send + Sync + 'static,
{
    /// Register the close of a completed inner session, so that a failure of
    /// the outer scope also tears down the inner resources.
    pub fn adopt(&mut self, session: Arc<SessionHandle<E>>)
    where
        E: From<FailureRecord<E>>,
    {
        let label = format!("session {}", session.name());
        self.push(
            CompensatingAction::local(label, move |_| session.close().map_err(E::from))
                .with_description("close nested session"),
        );
    }

    /// Run every action in reverse registration order.
    ///
    /// With `initial` set, that error is always the primary of the returned
    /// record and every action failure is attached as suppressed. Without
    /// it, the first failing action becomes the primary. Returns `None` when
    /// nothing failed and no initial error was given.
    #[must_use]
    pub fn drain_reverse(self, initial: Option<E>) -> Option<FailureRecord<E>> {
        let (record, _audit) = self.drain_reverse_with_audit(initial);
        record
    }

    /// Like [`drain_reverse`](Self::drain_reverse), also returning the audit
    /// log of the drain.
    #[must_use]
    pub fn drain_reverse_with_audit(
        self,
        initial: Option<E>,
    ) -> (Option<FailureRecord<E>>, DrainAuditLog) {
        self.drain_into(initial.map(FailureRecord::new))
    }

    /// Drain on top of an already started failure record.
    pub(crate) fn drain_into(
        mut self,
        mut record: Option<FailureRecord<E>>,
    ) -> (Option<FailureRecord<E>>, DrainAuditLog) {
        let mut audit = DrainAuditLog::new();
        let mut diagnostics = Vec::new();
        let actions = std::mem::take(&mut self.actions);

        if !actions.is_empty() {
            info!(count = actions.len(), "cleaning up resources");
        }

        for action in actions.into_iter().rev() {
            let label = action.label().to_string();
            let description = action.description().to_string();
            audit.record_start(&label, &description, action.kind());

            if self.keep_persistent && action.kind() == ActionKind::Persistent {
                warn!(action = %label, "skipping resource cleanup");
                audit.record_outcome(ActionStatus::Skipped, Vec::new());
                continue;
            }

            let mut sink = Diagnostics::default();
            let outcome = action.execute(&mut sink);
            let messages = sink.into_messages();
            for message in &messages {
                warn!(action = %label, %message, "compensation reported a problem");
                diagnostics.push(Diagnostic {
                    action: label.clone(),
                    message: message.clone(),
                });
            }

            match outcome {
                Ok(()) => {
                    debug!(action = %label, "compensated");
                    audit.record_outcome(ActionStatus::Compensated, messages);
                }
                Err(error) => {
                    warn!(action = %label, %error, "compensation failed");
                    audit.record_outcome(ActionStatus::CompensationFailed, messages);
                    match record.as_mut() {
                        Some(record) => record.suppress(CompensationError {
                            action: label,
                            description,
                            error,
                        }),
                        None => record = Some(FailureRecord::new(error)),
                    }
                }
            }
        }

        match record.as_mut() {
            Some(record) => record.extend_diagnostics(diagnostics),
            None if !diagnostics.is_empty() => {
                info!(count = diagnostics.len(), "cleanup finished with diagnostics");
            }
            None => {}
        }

        (record, audit)
    }
}

impl<E> Default for CleanupLedger<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for CleanupLedger<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupLedger")
            .field("actions", &self.actions)
            .field("keep_persistent", &self.keep_persistent)
            .finish()
    }
}

impl<E> Drop for CleanupLedger<E> {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                count = self.actions.len(),
                pending = ?self.labels(),
                "cleanup ledger dropped with pending compensations"
            );
        }
    }
}

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info};

use crate::action::CompensatingAction;
use crate::audit::DrainAuditLog;
use crate::error::FailureRecord;
use crate::handler::{FailureHandler, notify};
use crate::ledger::CleanupLedger;
use crate::policy::EnvironmentPolicy;

/// Error returned when registering cleanup on a session that is already
/// closed.
#[derive(Debug, thiserror::Error)]
#[error("session '{0}' is already closed")]
pub struct SessionClosed(pub String);

/// Owner of the compensations accumulated while provisioning a session.
///
/// The session is `Open` until [`close`](Self::close) is called for the first
/// time; further calls are no-ops. Dropping an open session closes it and
/// logs any failure instead of returning it.
pub struct SessionHandle<E>
where
    E: Error + Send + Sync + 'static,
{
    name: String,
    ledger: Mutex<Option<CleanupLedger<E>>>,
    closed: AtomicBool,
    handler: Arc<dyn FailureHandler>,
    policy: EnvironmentPolicy,
}

impl<E> SessionHandle<E>
where
    E: Error + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        ledger: CleanupLedger<E>,
        handler: Arc<dyn FailureHandler>,
        policy: EnvironmentPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            ledger: Mutex::new(Some(ledger)),
            closed: AtomicBool::new(false),
            handler,
            policy,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn policy(&self) -> &EnvironmentPolicy {
        &self.policy
    }

    /// Number of compensations still owned by this session.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock_ledger().as_ref().map_or(0, CleanupLedger::len)
    }

    /// Labels of compensations still owned by this session.
    #[must_use]
    pub fn pending_labels(&self) -> Vec<String> {
        self.lock_ledger().as_ref().map_or_else(Vec::new, |ledger| {
            ledger.labels().into_iter().map(str::to_string).collect()
        })
    }

    /// Register an additional compensation owned by this session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session was already closed; the
    /// action is dropped without running.
    pub fn push(&self, action: CompensatingAction<E>) -> Result<(), SessionClosed> {
        let mut guard = self.lock_ledger();
        match guard.as_mut() {
            Some(ledger) if !self.is_closed() => {
                ledger.push(action);
                Ok(())
            }
            _ => Err(SessionClosed(self.name.clone())),
        }
    }

    /// Run caller workload, reporting its failure to the failure handler.
    ///
    /// The workload error is returned unchanged as the primary of the
    /// record; a failing handler only adds a suppressed error. The ledger is
    /// not touched.
    ///
    /// # Errors
    ///
    /// Returns the workload's error wrapped in a [`FailureRecord`].
    ///
    /// # Panics
    ///
    /// Panics if the session is already closed.
    pub fn run<T, W, F>(&self, workload: F) -> Result<T, FailureRecord<W>>
    where
        F: FnOnce() -> Result<T, W>,
        W: Error + 'static,
    {
        assert!(
            !self.is_closed(),
            "session '{}' used after it was closed",
            self.name
        );

        workload().map_err(|error| {
            error!(session = %self.name, %error, "caught error during test, running failure handler");
            let mut record = FailureRecord::new(error);
            if let Some(failure) = notify(self.handler.as_ref(), &self.policy, record.primary()) {
                record.suppress(failure);
            }
            record
        })
    }

    /// Drain the ledger exactly once.
    ///
    /// # Errors
    ///
    /// Returns the record of the first drain if any compensation failed.
    /// Later calls always succeed.
    pub fn close(&self) -> Result<(), FailureRecord<E>> {
        match self.close_with_audit() {
            (Some(record), _) => Err(record),
            (None, _) => Ok(()),
        }
    }

    /// Like [`close`](Self::close), also returning the audit log when this
    /// call performed the drain.
    pub fn close_with_audit(&self) -> (Option<FailureRecord<E>>, Option<DrainAuditLog>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(session = %self.name, "session already closed");
            return (None, None);
        }

        info!(session = %self.name, "cleaning up test session");
        let Some(ledger) = self.lock_ledger().take() else {
            return (None, None);
        };
        let (record, audit) = ledger.drain_into(None);
        if let Some(record) = &record {
            info!(session = %self.name, error = %record, "cleanup resulted in error");
        }
        (record, Some(audit))
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, Option<CleanupLedger<E>>> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Drop for SessionHandle<E>
where
    E: Error + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        debug!(session = %self.name, "closing session on drop");
        if let Err(record) = self.close() {
            error!(session = %self.name, error = %record, "failed to clean up session on drop");
        }
    }
}

impl<E> std::fmt::Debug for SessionHandle<E>
where
    E: Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .field("closed", &self.closed)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

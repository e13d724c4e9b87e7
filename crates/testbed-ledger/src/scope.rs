use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::FailureRecord;
use crate::handler::{FailureHandler, LogFailureHandler, notify};
use crate::ledger::CleanupLedger;
use crate::policy::EnvironmentPolicy;
use crate::session::SessionHandle;

/// Runs a sequence of provisioning steps against a fresh ledger and rolls
/// them back if any step fails.
///
/// Scopes are cheap to clone and may be nested: an inner scope keeps its own
/// ledger, and the session it produces can be adopted by the outer ledger.
#[derive(Clone)]
pub struct TransactionalScope {
    handler: Arc<dyn FailureHandler>,
    policy: EnvironmentPolicy,
}

impl TransactionalScope {
    #[must_use]
    pub fn new(handler: Arc<dyn FailureHandler>, policy: EnvironmentPolicy) -> Self {
        Self { handler, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &EnvironmentPolicy {
        &self.policy
    }

    #[must_use]
    pub fn handler(&self) -> Arc<dyn FailureHandler> {
        Arc::clone(&self.handler)
    }

    /// Run `body` with an empty ledger.
    ///
    /// On success the value is returned and the ledger is not drained; the
    /// body is expected to move the ledger's contents into what it returns
    /// (see [`CleanupLedger::take`] and [`TransactionalScope::session`]).
    ///
    /// On failure the failure handler is notified first, then the ledger is
    /// drained in reverse with the body's error as primary.
    ///
    /// If the body panics the ledger is drained as well, then the panic
    /// continues.
    ///
    /// # Errors
    ///
    /// Returns a [`FailureRecord`] whose primary is the body's error, with
    /// handler and compensation failures attached as suppressed.
    pub fn run<R, E, F>(&self, body: F) -> Result<R, FailureRecord<E>>
    where
        F: FnOnce(&mut CleanupLedger<E>) -> Result<R, E>,
        E: Error + Send + Sync + 'static,
    {
        let mut ledger = CleanupLedger::for_policy(&self.policy);
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(&mut ledger))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                error!(pending = ledger.len(), "deployment panicked, rolling back");
                let (record, audit) = ledger.drain_into(None);
                debug!(summary = %audit.summary(), "rollback finished");
                if let Some(record) = record {
                    error!(error = %record, "rollback after panic failed");
                }
                panic::resume_unwind(payload);
            }
        };
        match outcome {
            Ok(value) => Ok(value),
            Err(error) => {
                info!(%error, "caught error during deployment, running failure handler");
                let mut record = FailureRecord::new(error);
                if let Some(failure) = notify(self.handler.as_ref(), &self.policy, record.primary())
                {
                    record.suppress(failure);
                }
                let (record, audit) = ledger.drain_into(Some(record));
                debug!(summary = %audit.summary(), "rollback finished");
                match record {
                    Some(record) => Err(record),
                    None => unreachable!("drain keeps the initial error"),
                }
            }
        }
    }

    /// Move the ledger's contents into a new session owned by the caller.
    #[must_use]
    pub fn session<E>(
        &self,
        name: impl Into<String>,
        ledger: &mut CleanupLedger<E>,
    ) -> SessionHandle<E>
    where
        E: Error + Send + Sync + 'static,
    {
        SessionHandle::new(name, ledger.take(), Arc::clone(&self.handler), self.policy)
    }
}

impl Default for TransactionalScope {
    fn default() -> Self {
        Self::new(Arc::new(LogFailureHandler), EnvironmentPolicy::default())
    }
}

impl std::fmt::Debug for TransactionalScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalScope")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

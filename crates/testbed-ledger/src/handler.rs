use std::error::Error;

use tracing::{debug, error, warn};

use crate::error::{BoxError, HandlerFailure};
use crate::policy::EnvironmentPolicy;

/// Sink for out-of-band diagnostics when a failure path starts.
///
/// Handlers capture external state (logs, resource dumps) for the error that
/// triggered the failure. Their own errors never replace that error.
pub trait FailureHandler: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if capturing diagnostics fails.
    fn on_failure(&self, error: &(dyn Error + 'static)) -> Result<(), BoxError>;
}

impl<F> FailureHandler for F
where
    F: Fn(&(dyn Error + 'static)) -> Result<(), BoxError> + Send + Sync,
{
    fn on_failure(&self, error: &(dyn Error + 'static)) -> Result<(), BoxError> {
        self(error)
    }
}

/// Handler that only logs the error chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailureHandler;

impl FailureHandler for LogFailureHandler {
    fn on_failure(&self, error: &(dyn Error + 'static)) -> Result<(), BoxError> {
        error!(%error, "failure during test session");
        let mut source = error.source();
        while let Some(cause) = source {
            error!(%cause, "caused by");
            source = cause.source();
        }
        Ok(())
    }
}

/// Run the handler best-effort, returning its failure for suppression.
pub(crate) fn notify(
    handler: &dyn FailureHandler,
    policy: &EnvironmentPolicy,
    error: &(dyn Error + 'static),
) -> Option<HandlerFailure> {
    if policy.skip_save_state {
        debug!("skipping failure handler");
        return None;
    }
    match handler.on_failure(error) {
        Ok(()) => None,
        Err(source) => {
            warn!(error = %source, "failed to run failure handler");
            Some(HandlerFailure { source })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn closures_are_handlers() {
        let calls = AtomicUsize::new(0);
        let handler = |_: &(dyn Error + 'static)| -> Result<(), BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        let failure = notify(&handler, &EnvironmentPolicy::default(), &Boom);

        assert!(failure.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_error_is_returned_for_suppression() {
        let handler =
            |_: &(dyn Error + 'static)| -> Result<(), BoxError> { Err("disk full".into()) };

        let failure = notify(&handler, &EnvironmentPolicy::default(), &Boom)
            .expect("handler failure is reported");

        assert_eq!(failure.to_string(), "failed to run failure handler");
        assert_eq!(failure.source.to_string(), "disk full");
    }

    #[test]
    fn skip_save_state_bypasses_handler() {
        let calls = AtomicUsize::new(0);
        let handler = |_: &(dyn Error + 'static)| -> Result<(), BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("should not run".into())
        };
        let policy = EnvironmentPolicy::default().with_skip_save_state(true);

        assert!(notify(&handler, &policy, &Boom).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn log_handler_never_fails() {
        assert!(LogFailureHandler.on_failure(&Boom).is_ok());
    }
}

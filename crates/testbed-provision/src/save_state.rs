use std::error::Error;
use std::sync::Arc;

use testbed_ledger::{BoxError, FailureHandler};
use tracing::info;

use crate::traits::StateCollector;

/// Failure handler capturing the state of the environment through a
/// [`StateCollector`].
#[derive(Clone)]
pub struct SaveStateHandler {
    collector: Arc<dyn StateCollector>,
}

impl SaveStateHandler {
    #[must_use]
    pub fn new(collector: Arc<dyn StateCollector>) -> Self {
        Self { collector }
    }
}

impl FailureHandler for SaveStateHandler {
    fn on_failure(&self, error: &(dyn Error + 'static)) -> Result<(), BoxError> {
        info!(%error, "saving state");
        self.collector.save_state(&error.to_string())
    }
}

impl std::fmt::Debug for SaveStateHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveStateHandler").finish_non_exhaustive()
    }
}

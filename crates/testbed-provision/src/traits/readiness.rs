use std::sync::Arc;

use testbed_core::{Condition, Readiness, ResourceKey};

use crate::Result;
use crate::traits::ResourceClient;

/// Observes whether a resource has reached a condition.
///
/// Observation must not have side effects; it is polled repeatedly.
pub trait ReadinessObserver: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the resource state cannot be read.
    fn observe(&self, key: &ResourceKey, condition: &Condition) -> Result<Readiness>;
}

/// Observer deriving readiness from the snapshots of a [`ResourceClient`].
#[derive(Clone)]
pub struct SnapshotObserver {
    client: Arc<dyn ResourceClient>,
}

impl SnapshotObserver {
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }
}

impl ReadinessObserver for SnapshotObserver {
    fn observe(&self, key: &ResourceKey, condition: &Condition) -> Result<Readiness> {
        Ok(match (self.client.get(key)?, condition) {
            (None, Condition::Gone) => Readiness::Ready,
            (None, Condition::Named(_)) => Readiness::Pending,
            (Some(snapshot), condition) => snapshot.readiness(condition),
        })
    }
}

use testbed_ledger::BoxError;

/// Captures external system state for post-mortem analysis.
pub trait StateCollector: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the state cannot be captured or stored.
    fn save_state(&self, reason: &str) -> Result<(), BoxError>;
}

use testbed_core::CoreError;
use testbed_ledger::FailureRecord;
use testbed_provision::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid input")]
    Input(#[from] CoreError),

    #[error("provisioning failed")]
    Provisioning(#[source] Box<FailureRecord<SessionError>>),

    #[error("workload failed")]
    Workload(#[source] Box<FailureRecord<SessionError>>),

    #[error("teardown failed")]
    Teardown(#[source] Box<FailureRecord<SessionError>>),
}

impl CliError {
    pub fn provisioning(record: FailureRecord<SessionError>) -> Self {
        Self::Provisioning(Box::new(record))
    }

    /// The failure record behind a session error, for printing what was
    /// suppressed while handling it.
    #[must_use]
    pub fn record(&self) -> Option<&FailureRecord<SessionError>> {
        match self {
            Self::Provisioning(record) | Self::Workload(record) | Self::Teardown(record) => {
                Some(record)
            }
            Self::Input(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

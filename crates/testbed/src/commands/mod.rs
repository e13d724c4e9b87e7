mod faults;
mod plan;
mod session;
mod simulate;

use std::path::PathBuf;

use clap::Subcommand;
use testbed_core::SessionConfig;
use testbed_ledger::{DrainAuditLog, FailureRecord};
use testbed_provision::SessionError;

use crate::error::{CliError, Result};
use crate::output;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Show the order in which a plan is provisioned and torn down
    Plan {
        /// Resource plan (TOML)
        file: PathBuf,
    },
    /// Provision a plan on a simulated cluster, then tear it down
    Simulate(simulate::SimulateArgs),
    /// Deploy an IoT test session on a simulated cluster, then tear it down
    Session(session::SessionArgs),
}

impl Commands {
    pub(crate) fn execute(self, config: &SessionConfig) -> Result<()> {
        match self {
            Self::Plan { file } => plan::run(&file),
            Self::Simulate(args) => simulate::run(args, config),
            Self::Session(args) => session::run(args, config),
        }
    }
}

/// Print the teardown and combine its outcome with the workload's.
///
/// A failed workload stays the reported error; teardown failures are
/// attached to it.
fn conclude(
    outcome: std::result::Result<(), FailureRecord<SessionError>>,
    (teardown, audit): (Option<FailureRecord<SessionError>>, Option<DrainAuditLog>),
) -> Result<()> {
    if let Some(audit) = audit {
        println!("teardown:");
        println!("{}", output::indent(&audit.summary()));
    }

    match (outcome, teardown) {
        (Ok(()), None) => Ok(()),
        (Ok(()), Some(teardown)) => Err(CliError::Teardown(Box::new(teardown))),
        (Err(record), None) => Err(CliError::Workload(Box::new(record))),
        (Err(mut record), Some(teardown)) => {
            record.suppress(teardown);
            Err(CliError::Workload(Box::new(record)))
        }
    }
}

/// Workload of the simulated runs: succeed, or fail with `message`.
fn workload(message: Option<&str>) -> std::result::Result<(), SessionError> {
    match message {
        Some(message) => Err(SessionError::workload(message.to_string())),
        None => Ok(()),
    }
}

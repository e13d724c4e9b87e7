use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use testbed_core::{ResourcePlan, SessionConfig};
use testbed_ledger::TransactionalScope;
use testbed_provision::Provisioner;
use tracing::info;

use super::faults::FaultArgs;
use crate::error::{CliError, Result};

#[derive(Args)]
pub(crate) struct SimulateArgs {
    /// Resource plan (TOML)
    file: PathBuf,

    #[command(flatten)]
    faults: FaultArgs,

    /// Let the workload fail with this message
    #[arg(long, value_name = "MESSAGE")]
    fail_workload: Option<String>,
}

pub(super) fn run(args: SimulateArgs, config: &SessionConfig) -> Result<()> {
    let plan = ResourcePlan::load(&args.file)?;
    let cluster = Arc::new(args.faults.cluster());
    let backend = cluster.backend();
    let provisioner = Provisioner::new(
        Arc::clone(&backend.client),
        Arc::clone(&backend.observer),
        config.poll,
    );
    let scope = TransactionalScope::new(backend.default_handler(), config.policy);

    let session = provisioner
        .provision_plan(&plan, &scope)
        .map_err(CliError::provisioning)?;
    println!(
        "provisioned {} resource(s) from plan '{}'",
        plan.resources.len(),
        plan.display_name()
    );

    let outcome = session.run(|| super::workload(args.fail_workload.as_deref()));
    info!(events = cluster.events().len(), "workload finished");
    super::conclude(outcome, session.close_with_audit())
}

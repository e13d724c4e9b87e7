use std::sync::Arc;

use clap::Args;
use testbed_core::{AdapterKind, SessionConfig};
use testbed_provision::{TestSession, with_default_services};

use super::faults::FaultArgs;
use crate::error::{CliError, Result};

#[derive(Args)]
pub(crate) struct SessionArgs {
    /// Adapters to enable, all when omitted
    #[arg(long, value_enum, value_delimiter = ',')]
    adapters: Vec<AdapterKind>,

    /// Name of the default tenant, random when omitted
    #[arg(long)]
    tenant: Option<String>,

    /// Deploy a device registry database with the infrastructure
    #[arg(long)]
    default_services: bool,

    #[command(flatten)]
    faults: FaultArgs,

    /// Let the workload fail with this message
    #[arg(long, value_name = "MESSAGE")]
    fail_workload: Option<String>,
}

pub(super) fn run(args: SessionArgs, config: &SessionConfig) -> Result<()> {
    let cluster = Arc::new(args.faults.cluster().with_iot_controllers());

    let mut builder = TestSession::builder(cluster.backend(), config.clone());
    if !args.adapters.is_empty() {
        builder = builder.adapters(&args.adapters);
    }
    if let Some(name) = args.tenant {
        builder = builder.tenant_name(name);
    }
    if args.default_services {
        builder = builder.pre_deploy(with_default_services());
    }

    let session = builder.deploy().map_err(CliError::provisioning)?;
    println!(
        "deployed session '{}' with tenant '{}'",
        session.name(),
        session.tenant().tenant_id()
    );

    let outcome = session.run(|session| {
        for kind in AdapterKind::ALL {
            if kind.is_enabled(session.infra()) {
                let client = session.connect_adapter(kind)?;
                println!("  {kind} adapter at {}", client.endpoint());
            }
        }
        super::workload(args.fail_workload.as_deref())
    });
    super::conclude(outcome, session.close_with_audit())
}

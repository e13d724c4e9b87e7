use std::path::PathBuf;

use clap::Args;
use testbed_provision::{Fault, SimulatedCluster};

/// Faults to inject into the simulated cluster. Selectors are `Kind` or
/// `Kind/name`.
#[derive(Args, Debug, Default)]
pub(crate) struct FaultArgs {
    /// Reject creation of matching resources
    #[arg(long, value_name = "SELECTOR")]
    fail_create: Vec<String>,

    /// Reject deletion of matching resources
    #[arg(long, value_name = "SELECTOR")]
    fail_delete: Vec<String>,

    /// Matching resources never become ready
    #[arg(long, value_name = "SELECTOR")]
    never_ready: Vec<String>,

    /// Matching resources fail permanently while becoming ready
    #[arg(long, value_name = "SELECTOR")]
    fail_ready: Vec<String>,

    /// Write a JSON dump of the cluster here whenever a failure is handled
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,
}

impl FaultArgs {
    pub(crate) fn cluster(&self) -> SimulatedCluster {
        let faults = [
            (&self.fail_create, Fault::FailCreate),
            (&self.fail_delete, Fault::FailDelete),
            (&self.never_ready, Fault::NeverReady),
            (
                &self.fail_ready,
                Fault::PermanentlyFailed("injected failure".to_string()),
            ),
        ];

        let mut cluster = SimulatedCluster::new();
        for (selectors, fault) in faults {
            for selector in selectors {
                cluster = cluster.with_fault(selector.as_str(), fault.clone());
            }
        }
        if let Some(dir) = &self.state_dir {
            cluster = cluster.state_dir(dir);
        }
        cluster
    }
}

#[cfg(test)]
mod tests {
    use testbed_core::{Condition, Readiness, ResourceDescriptor, ResourceKey};
    use testbed_provision::traits::{ReadinessObserver, ResourceClient};

    use super::*;

    #[test]
    fn selectors_become_faults() {
        let args = FaultArgs {
            fail_create: vec!["Secret".to_string()],
            fail_ready: vec!["ConfigMap/b".to_string()],
            ..FaultArgs::default()
        };
        let cluster = args.cluster();
        let secret = ResourceKey::new("v1", "Secret", "demo", "a").expect("valid key");
        let map = ResourceKey::new("v1", "ConfigMap", "demo", "b").expect("valid key");

        assert!(
            cluster
                .create(&ResourceDescriptor::new(secret, serde_json::Value::Null))
                .is_err()
        );
        cluster
            .create(&ResourceDescriptor::new(map.clone(), serde_json::Value::Null))
            .expect("created");
        assert_eq!(
            cluster.observe(&map, &Condition::ready()).expect("observed"),
            Readiness::Failed("injected failure".to_string())
        );
    }
}

//! Provisioning of generic resource plans.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use testbed_core::{PollPolicy, ResourcePlan};
use testbed_ledger::TransactionalScope;
use testbed_provision::{Fault, Provisioner, SessionError, SimulatedCluster};

const PLAN: &str = r#"
name = "three-maps"

[[resource]]
api_version = "v1"
kind = "ConfigMap"
namespace = "demo"
name = "r1"

[[resource]]
api_version = "v1"
kind = "ConfigMap"
namespace = "demo"
name = "r2"
ready_condition = "Synced"

[[resource]]
api_version = "v1"
kind = "ConfigMap"
namespace = "demo"
name = "r3"

[resource.spec]
data = { greeting = "hello" }
"#;

fn load_plan() -> (TempDir, ResourcePlan) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("plan.toml");
    fs::write(&path, PLAN).expect("write plan");
    let plan = ResourcePlan::load(&path).expect("valid plan");
    (dir, plan)
}

fn provisioner(cluster: &Arc<SimulatedCluster>) -> Provisioner {
    Provisioner::new(
        cluster.clone(),
        cluster.clone(),
        PollPolicy::new(Duration::from_millis(30), Duration::from_millis(1)),
    )
}

fn history(cluster: &SimulatedCluster) -> Vec<String> {
    cluster
        .history()
        .into_iter()
        .filter(|line| !line.starts_with("ready") && !line.starts_with("save-state"))
        .collect()
}

#[test]
fn failed_create_rolls_back_earlier_resources_in_reverse() {
    let (_dir, plan) = load_plan();
    let cluster = Arc::new(SimulatedCluster::new().fail_create("ConfigMap/r3"));

    let record = provisioner(&cluster)
        .provision_plan(&plan, &TransactionalScope::default())
        .expect_err("r3 is rejected");

    assert!(matches!(
        record.primary(),
        SessionError::Client { key, .. } if key.name == "r3"
    ));
    assert!(record.suppressed().is_empty());
    assert_eq!(
        history(&cluster),
        [
            "create v1/ConfigMap: demo/r1",
            "create v1/ConfigMap: demo/r2",
            "reject-create v1/ConfigMap: demo/r3",
            "delete v1/ConfigMap: demo/r2",
            "delete v1/ConfigMap: demo/r1",
        ]
    );
}

#[test]
fn permanent_failure_is_a_provisioning_error() {
    let (_dir, plan) = load_plan();
    let cluster = Arc::new(
        SimulatedCluster::new()
            .with_fault("ConfigMap/r2", Fault::PermanentlyFailed("bad spec".to_string())),
    );

    let record = provisioner(&cluster)
        .provision_plan(&plan, &TransactionalScope::default())
        .expect_err("r2 fails");

    assert!(matches!(
        record.primary(),
        SessionError::PermanentlyFailed { reason, .. } if reason == "bad spec"
    ));
    assert!(cluster.resources().is_empty());
}

#[test]
fn workload_failure_leaves_ledger_until_close() {
    let (_dir, plan) = load_plan();
    let cluster = Arc::new(SimulatedCluster::new());
    let session = provisioner(&cluster)
        .provision_plan(&plan, &TransactionalScope::default())
        .expect("provisioned");

    let record = session
        .run(|| Err::<(), _>(SessionError::workload("assertion on device failed")))
        .expect_err("workload fails");

    assert_eq!(record.primary().to_string(), "test workload failed");
    assert_eq!(session.name(), "three-maps");
    assert_eq!(session.pending(), 3);
    assert_eq!(cluster.resources().len(), 3);

    session.close().expect("closed");

    assert!(cluster.resources().is_empty());
    assert_eq!(
        history(&cluster)[3..],
        [
            "delete v1/ConfigMap: demo/r3",
            "delete v1/ConfigMap: demo/r2",
            "delete v1/ConfigMap: demo/r1",
        ]
    );
}

fn stored(cluster: &SimulatedCluster, name: &str) -> Option<serde_json::Value> {
    cluster.dump()["resources"].as_array().and_then(|resources| {
        resources
            .iter()
            .find(|resource| resource["key"]["name"] == name)
            .cloned()
    })
}

#[test]
fn spec_and_ready_condition_come_from_plan() -> anyhow::Result<()> {
    let (_dir, plan) = load_plan();
    let cluster = Arc::new(SimulatedCluster::new());
    let session = provisioner(&cluster).provision_plan(&plan, &TransactionalScope::default())?;

    let r3 = plan.resources[2].key()?;
    let r3 = stored(&cluster, &r3.name).ok_or_else(|| anyhow::anyhow!("r3 missing"))?;
    assert_eq!(r3["spec"]["data"]["greeting"], "hello");

    let r2 = plan.resources[1].key()?;
    let r2 = stored(&cluster, &r2.name).ok_or_else(|| anyhow::anyhow!("r2 missing"))?;
    assert_eq!(r2["conditions"]["Synced"], "True");

    session.close()?;
    Ok(())
}

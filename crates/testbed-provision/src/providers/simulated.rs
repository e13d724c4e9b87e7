//! An in-memory cluster with scripted faults, used for tests and dry runs.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};
use testbed_core::{
    AdapterKind, Condition, ConditionStatus, Endpoint, InfrastructureSpec, Propagation, Readiness,
    ResourceDescriptor, ResourceKey, ResourceSnapshot,
};
use testbed_ledger::BoxError;
use tracing::{debug, info};

use crate::session::Backend;
use crate::session::resources;
use crate::traits::{
    ClientFactory, ClientRequest, ClientRole, ProtocolClient, ReadinessObserver, ResourceClient,
    StateCollector,
};
use crate::{Result, SessionError};

/// Misbehavior injected for resources matching a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    FailCreate,
    FailDelete,
    NeverReady,
    PermanentlyFailed(String),
    /// Ready on the n-th readiness poll.
    ReadyAfter(u32),
}

/// Creates the dependents of a resource and fills in its status.
pub type Controller = Arc<dyn Fn(&mut ResourceSnapshot) -> Vec<ResourceSnapshot> + Send + Sync>;

/// Something that happened in the simulated cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterEvent {
    pub at: String,
    pub action: String,
    pub subject: String,
}

struct FaultRule {
    selector: String,
    fault: Fault,
}

impl FaultRule {
    /// Selectors are either `Kind` or `Kind/name`.
    fn matches(&self, key: &ResourceKey) -> bool {
        match self.selector.split_once('/') {
            Some((kind, name)) => kind == key.kind && name == key.name,
            None => self.selector == key.kind,
        }
    }
}

struct Stored {
    snapshot: ResourceSnapshot,
    owner: Option<ResourceKey>,
    polls: u32,
}

#[derive(Default)]
struct State {
    resources: IndexMap<ResourceKey, Stored>,
    events: Vec<ClusterEvent>,
    saved: Vec<String>,
    open_clients: usize,
}

impl State {
    fn record(&mut self, action: &str, subject: impl fmt::Display) {
        self.events.push(ClusterEvent {
            at: Utc::now().to_rfc3339(),
            action: action.to_string(),
            subject: subject.to_string(),
        });
    }

    fn dump(&self) -> Value {
        let resources: Vec<&ResourceSnapshot> =
            self.resources.values().map(|stored| &stored.snapshot).collect();
        json!({
            "resources": resources,
            "events": self.events,
            "open_clients": self.open_clients,
        })
    }
}

/// A cluster kept in memory.
///
/// Resources become ready on their first readiness poll unless a [`Fault`]
/// says otherwise. Controllers registered per kind create dependents, which
/// are removed together with their owner.
#[derive(Default)]
pub struct SimulatedCluster {
    state: Arc<Mutex<State>>,
    faults: Vec<FaultRule>,
    controllers: HashMap<String, Controller>,
    state_dir: Option<PathBuf>,
}

impl SimulatedCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fault(mut self, selector: impl Into<String>, fault: Fault) -> Self {
        self.faults.push(FaultRule {
            selector: selector.into(),
            fault,
        });
        self
    }

    #[must_use]
    pub fn fail_create(self, selector: impl Into<String>) -> Self {
        self.with_fault(selector, Fault::FailCreate)
    }

    #[must_use]
    pub fn fail_delete(self, selector: impl Into<String>) -> Self {
        self.with_fault(selector, Fault::FailDelete)
    }

    #[must_use]
    pub fn never_ready(self, selector: impl Into<String>) -> Self {
        self.with_fault(selector, Fault::NeverReady)
    }

    #[must_use]
    pub fn on_create<F>(mut self, kind: impl Into<String>, controller: F) -> Self
    where
        F: Fn(&mut ResourceSnapshot) -> Vec<ResourceSnapshot> + Send + Sync + 'static,
    {
        self.controllers.insert(kind.into(), Arc::new(controller));
        self
    }

    /// Controllers deploying the enabled protocol adapters of an IoT
    /// infrastructure and assigning hosts to messaging endpoints.
    #[must_use]
    pub fn with_iot_controllers(self) -> Self {
        self.on_create("IoTInfrastructure", deploy_adapters)
            .on_create("MessagingEndpoint", assign_endpoint)
    }

    /// Also write every saved state as JSON into `dir`.
    #[must_use]
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Collaborators of a session backed by this cluster.
    #[must_use]
    pub fn backend(self: &Arc<Self>) -> Backend {
        Backend::new(
            Arc::clone(self) as Arc<dyn ResourceClient>,
            Arc::clone(self) as Arc<dyn ReadinessObserver>,
            Arc::clone(self) as Arc<dyn ClientFactory>,
        )
        .with_collector(Arc::clone(self) as Arc<dyn StateCollector>)
    }

    #[must_use]
    pub fn exists(&self, key: &ResourceKey) -> bool {
        self.lock().resources.contains_key(key)
    }

    /// Keys of all resources, in creation order.
    #[must_use]
    pub fn resources(&self) -> Vec<ResourceKey> {
        self.lock().resources.keys().cloned().collect()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.lock().events.clone()
    }

    /// `action subject` of every event, for asserting on order.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .map(|event| format!("{} {}", event.action, event.subject))
            .collect()
    }

    /// Reasons passed to [`StateCollector::save_state`].
    #[must_use]
    pub fn saved_states(&self) -> Vec<String> {
        self.lock().saved.clone()
    }

    #[must_use]
    pub fn open_clients(&self) -> usize {
        self.lock().open_clients
    }

    #[must_use]
    pub fn dump(&self) -> Value {
        self.lock().dump()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fault(&self, key: &ResourceKey, wanted: impl Fn(&Fault) -> bool) -> Option<&Fault> {
        self.faults
            .iter()
            .find(|rule| rule.matches(key) && wanted(&rule.fault))
            .map(|rule| &rule.fault)
    }

    fn rejected(key: &ResourceKey, message: &str) -> SessionError {
        SessionError::Client {
            key: key.clone(),
            message: message.to_string(),
        }
    }
}

impl ResourceClient for SimulatedCluster {
    fn create(&self, resource: &ResourceDescriptor) -> Result<()> {
        let key = &resource.key;
        let mut guard = self.lock();
        let state = &mut *guard;

        if self.fault(key, |f| *f == Fault::FailCreate).is_some() {
            state.record("reject-create", key);
            return Err(Self::rejected(key, "create rejected by injected fault"));
        }
        if state.resources.contains_key(key) {
            return Err(Self::rejected(key, "already exists"));
        }

        let mut snapshot = ResourceSnapshot::new(key.clone(), resource.spec.clone());
        let children = self
            .controllers
            .get(&key.kind)
            .map(|controller| controller(&mut snapshot))
            .unwrap_or_default();

        state.record("create", key);
        state.resources.insert(
            key.clone(),
            Stored {
                snapshot,
                owner: None,
                polls: 0,
            },
        );
        for child in children {
            state.record("create", &child.key);
            state.resources.insert(
                child.key.clone(),
                Stored {
                    snapshot: child,
                    owner: Some(key.clone()),
                    polls: 0,
                },
            );
        }
        Ok(())
    }

    fn delete(&self, key: &ResourceKey, propagation: Propagation) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if self.fault(key, |f| *f == Fault::FailDelete).is_some() {
            state.record("reject-delete", key);
            return Err(Self::rejected(key, "delete rejected by injected fault"));
        }
        if state.resources.shift_remove(key).is_none() {
            return Err(SessionError::NotFound(key.clone()));
        }
        debug!(resource = %key, ?propagation, "deleted simulated resource");

        let mut owners = vec![key.clone()];
        while let Some(owner) = owners.pop() {
            let children: Vec<ResourceKey> = state
                .resources
                .iter()
                .filter(|(_, stored)| stored.owner.as_ref() == Some(&owner))
                .map(|(child, _)| child.clone())
                .collect();
            for child in children {
                state.resources.shift_remove(&child);
                state.record("delete", &child);
                owners.push(child);
            }
        }
        state.record("delete", key);
        Ok(())
    }

    fn get(&self, key: &ResourceKey) -> Result<Option<ResourceSnapshot>> {
        Ok(self
            .lock()
            .resources
            .get(key)
            .map(|stored| stored.snapshot.clone()))
    }

    fn external_endpoint(&self, namespace: &str, name: &str) -> Result<Endpoint> {
        let exposed = self
            .lock()
            .resources
            .keys()
            .any(|key| key.namespace == namespace && key.name == name);
        if !exposed {
            return Err(SessionError::NoExternalEndpoint {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(Endpoint {
            host: format!("{name}-{namespace}.apps.simulated"),
            port: 443,
        })
    }
}

impl ReadinessObserver for SimulatedCluster {
    fn observe(&self, key: &ResourceKey, condition: &Condition) -> Result<Readiness> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Condition::Named(name) = condition else {
            return Ok(if state.resources.contains_key(key) {
                Readiness::Pending
            } else {
                Readiness::Ready
            });
        };
        let Some(stored) = state.resources.get_mut(key) else {
            return Ok(Readiness::Pending);
        };

        stored.polls += 1;
        let fault = self.fault(key, |f| {
            matches!(
                f,
                Fault::NeverReady | Fault::PermanentlyFailed(_) | Fault::ReadyAfter(_)
            )
        });
        let became_ready = match fault {
            Some(Fault::PermanentlyFailed(reason)) => {
                stored.snapshot.failure = Some(reason.clone());
                false
            }
            Some(Fault::NeverReady) => false,
            Some(Fault::ReadyAfter(polls)) if stored.polls < *polls => false,
            _ => {
                stored
                    .snapshot
                    .conditions
                    .insert(name.clone(), ConditionStatus::True)
                    != Some(ConditionStatus::True)
            }
        };
        let readiness = stored.snapshot.readiness(condition);
        if became_ready {
            state.record("ready", key);
        }
        Ok(readiness)
    }
}

impl StateCollector for SimulatedCluster {
    fn save_state(&self, reason: &str) -> std::result::Result<(), BoxError> {
        let (index, dump) = {
            let mut state = self.lock();
            state.saved.push(reason.to_string());
            state.record("save-state", reason);
            (state.saved.len(), state.dump())
        };
        info!(reason, "saved simulated cluster state");

        if let Some(dir) = &self.state_dir {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!("state-{index}.json"));
            fs::write(&path, serde_json::to_string_pretty(&dump)?)?;
            debug!(path = %path.display(), "wrote state dump");
        }
        Ok(())
    }
}

impl ClientFactory for SimulatedCluster {
    fn connect(&self, request: &ClientRequest) -> Result<Arc<dyn ProtocolClient>> {
        {
            let mut state = self.lock();
            state.open_clients += 1;
            state.record("connect", format!("{} {}", request.role, request.endpoint));
        }
        Ok(Arc::new(SimulatedClient {
            role: request.role,
            endpoint: request.endpoint.clone(),
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        }))
    }
}

impl fmt::Debug for SimulatedCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedCluster")
            .field("faults", &self.faults.len())
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .field("state_dir", &self.state_dir)
            .finish_non_exhaustive()
    }
}

struct SimulatedClient {
    role: ClientRole,
    endpoint: Endpoint,
    closed: AtomicBool,
    state: Arc<Mutex<State>>,
}

impl ProtocolClient for SimulatedClient {
    fn role(&self) -> ClientRole {
        self.role
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open_clients = state.open_clients.saturating_sub(1);
        state.record("close", format!("{} {}", self.role, self.endpoint));
        Ok(())
    }
}

fn deploy_adapters(snapshot: &mut ResourceSnapshot) -> Vec<ResourceSnapshot> {
    let infra: InfrastructureSpec =
        serde_json::from_value(snapshot.spec.clone()).unwrap_or_default();
    let namespace = snapshot.key.namespace.clone();
    snapshot.status = json!({ "phase": "Active" });

    AdapterKind::ALL
        .into_iter()
        .filter(|kind| kind.is_enabled(&infra))
        .filter_map(|kind| resources::adapter_deployment_key(&namespace, kind).ok())
        .map(|key| {
            let mut deployment = ResourceSnapshot::new(key, json!({ "replicas": 1 }));
            deployment
                .conditions
                .insert("Available".to_string(), ConditionStatus::True);
            deployment
        })
        .collect()
}

fn assign_endpoint(snapshot: &mut ResourceSnapshot) -> Vec<ResourceSnapshot> {
    let key = &snapshot.key;
    snapshot.status = json!({
        "host": format!("{}.{}.simulated", key.name, key.namespace),
        "ports": [{ "name": "amqps", "protocol": "AMQPS", "port": 5671 }],
    });
    Vec::new()
}

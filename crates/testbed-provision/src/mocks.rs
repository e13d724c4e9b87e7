use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use testbed_core::{
    ConditionStatus, Endpoint, Propagation, ResourceDescriptor, ResourceKey, ResourceSnapshot,
};

use crate::traits::{ClientFactory, ClientRequest, ClientRole, ProtocolClient, ResourceClient};
use crate::{Result, SessionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(ResourceKey),
    Delete(ResourceKey),
}

/// In-memory cluster keyed by resource name, with per-name faults.
#[derive(Default)]
pub struct MockCluster {
    resources: Mutex<BTreeMap<ResourceKey, ResourceSnapshot>>,
    calls: Mutex<Vec<Call>>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    never_ready: HashSet<String>,
}

impl MockCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fail_create(mut self, name: &str) -> Self {
        self.fail_create.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn fail_delete(mut self, name: &str) -> Self {
        self.fail_delete.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn never_ready(mut self, name: &str) -> Self {
        self.never_ready.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn set_status(&self, key: &ResourceKey, status: serde_json::Value) {
        if let Some(snapshot) = self.resources.lock().expect("resources lock").get_mut(key) {
            snapshot.status = status;
        }
    }

    fn client_error(key: &ResourceKey, message: &str) -> SessionError {
        SessionError::Client {
            key: key.clone(),
            message: message.to_string(),
        }
    }
}

impl ResourceClient for MockCluster {
    fn create(&self, resource: &ResourceDescriptor) -> Result<()> {
        let key = &resource.key;
        if self.fail_create.contains(&key.name) {
            return Err(Self::client_error(key, "create rejected"));
        }
        self.calls
            .lock()
            .expect("calls lock")
            .push(Call::Create(key.clone()));
        let mut snapshot = ResourceSnapshot::new(key.clone(), resource.spec.clone());
        if !self.never_ready.contains(&key.name) {
            snapshot
                .conditions
                .insert("Ready".to_string(), ConditionStatus::True);
        }
        self.resources
            .lock()
            .expect("resources lock")
            .insert(key.clone(), snapshot);
        Ok(())
    }

    fn delete(&self, key: &ResourceKey, _propagation: Propagation) -> Result<()> {
        if self.fail_delete.contains(&key.name) {
            return Err(Self::client_error(key, "delete rejected"));
        }
        match self.resources.lock().expect("resources lock").remove(key) {
            Some(_) => {
                self.calls
                    .lock()
                    .expect("calls lock")
                    .push(Call::Delete(key.clone()));
                Ok(())
            }
            None => Err(SessionError::NotFound(key.clone())),
        }
    }

    fn get(&self, key: &ResourceKey) -> Result<Option<ResourceSnapshot>> {
        Ok(self
            .resources
            .lock()
            .expect("resources lock")
            .get(key)
            .cloned())
    }

    fn external_endpoint(&self, namespace: &str, name: &str) -> Result<Endpoint> {
        Ok(Endpoint {
            host: format!("{name}.{namespace}.mock"),
            port: 443,
        })
    }
}

pub struct MockClient {
    role: ClientRole,
    endpoint: Endpoint,
    closed: AtomicBool,
    fail_close: bool,
}

impl MockClient {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ProtocolClient for MockClient {
    fn role(&self) -> ClientRole {
        self.role
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if self.fail_close {
            return Err(SessionError::ClientClose {
                role: self.role.to_string(),
                source: "connection reset".into(),
            });
        }
        Ok(())
    }
}

/// Factory keeping every client it created.
#[derive(Default)]
pub struct MockClientFactory {
    clients: Mutex<Vec<Arc<MockClient>>>,
    fail_close: bool,
}

impl MockClientFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().expect("clients lock").clone()
    }
}

impl ClientFactory for MockClientFactory {
    fn connect(&self, request: &ClientRequest) -> Result<Arc<dyn ProtocolClient>> {
        let client = Arc::new(MockClient {
            role: request.role,
            endpoint: request.endpoint.clone(),
            closed: AtomicBool::new(false),
            fail_close: self.fail_close,
        });
        self.clients
            .lock()
            .expect("clients lock")
            .push(Arc::clone(&client));
        Ok(client)
    }
}

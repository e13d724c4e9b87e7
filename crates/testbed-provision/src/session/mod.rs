//! IoT test sessions: infrastructure, a default tenant, and the clients
//! talking to them, torn down in reverse when the session closes.

mod builder;
pub mod resources;
mod tenant;

use std::error::Error;
use std::sync::Arc;

use testbed_core::{AdapterKind, InfrastructureSpec, SessionConfig, TenantSpec};
use testbed_ledger::{
    CompensatingAction, DrainAuditLog, FailureHandler, FailureRecord, LogFailureHandler,
    SessionHandle, TransactionalScope,
};
use tracing::{info, warn};

pub use builder::{PreDeployContext, SessionBuilder, with_default_services};
pub use tenant::{TenantBuilder, TenantInstance};

use crate::provisioner::Provisioner;
use crate::save_state::SaveStateHandler;
use crate::traits::{
    ClientFactory, ClientRequest, ClientRole, ProtocolClient, ReadinessObserver, ResourceClient,
    StateCollector,
};
use crate::{Result, SessionError};

/// The external collaborators a session talks to.
#[derive(Clone)]
pub struct Backend {
    pub client: Arc<dyn ResourceClient>,
    pub observer: Arc<dyn ReadinessObserver>,
    pub clients: Arc<dyn ClientFactory>,
    pub collector: Option<Arc<dyn StateCollector>>,
}

impl Backend {
    #[must_use]
    pub fn new(
        client: Arc<dyn ResourceClient>,
        observer: Arc<dyn ReadinessObserver>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            client,
            observer,
            clients,
            collector: None,
        }
    }

    #[must_use]
    pub fn with_collector(mut self, collector: Arc<dyn StateCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Save state through the collector if there is one, otherwise only log.
    #[must_use]
    pub fn default_handler(&self) -> Arc<dyn FailureHandler> {
        match &self.collector {
            Some(collector) => Arc::new(SaveStateHandler::new(Arc::clone(collector))),
            None => Arc::new(LogFailureHandler),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("collector", &self.collector.is_some())
            .finish_non_exhaustive()
    }
}

/// Everything nested scopes of a session share.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) handle: Arc<SessionHandle<SessionError>>,
    pub(crate) provisioner: Provisioner,
    pub(crate) scope: TransactionalScope,
    pub(crate) backend: Backend,
    pub(crate) config: SessionConfig,
}

impl SessionContext {
    /// Connect a client and register its close with the session.
    fn connect(&self, request: &ClientRequest) -> Result<Arc<dyn ProtocolClient>> {
        info!(role = %request.role, endpoint = %request.endpoint, "creating client");
        let client = self.backend.clients.connect(request)?;
        let closing = Arc::clone(&client);
        let action = CompensatingAction::local(format!("{} client", request.role), move |_| {
            closing.close()
        });
        if let Err(closed) = self.handle.push(action) {
            if let Err(error) = client.close() {
                warn!(%error, "failed to close client of a closed session");
            }
            return Err(closed.into());
        }
        Ok(client)
    }
}

/// A deployed IoT infrastructure with its default tenant.
///
/// Closing the session deletes everything it created, most recent first.
/// Dropping it without closing does the same but only logs failures.
pub struct TestSession {
    context: SessionContext,
    infra: InfrastructureSpec,
    tenant: TenantInstance,
}

impl TestSession {
    #[must_use]
    pub fn builder(backend: Backend, config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(backend, config)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.context.handle.name()
    }

    /// The infrastructure as it was deployed.
    #[must_use]
    pub fn infra(&self) -> &InfrastructureSpec {
        &self.infra
    }

    #[must_use]
    pub fn tenant(&self) -> &TenantInstance {
        &self.tenant
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.context.config
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<SessionHandle<SessionError>> {
        &self.context.handle
    }

    #[must_use]
    pub fn provisioner(&self) -> &Provisioner {
        &self.context.provisioner
    }

    /// Start building an additional tenant in the tenant namespace.
    #[must_use]
    pub fn new_tenant(&self, name: impl Into<String>) -> TenantBuilder {
        TenantBuilder::new(self.context.clone(), name.into(), TenantSpec::default())
    }

    /// Run test code against the session.
    ///
    /// # Errors
    ///
    /// Returns the workload's error unchanged as primary, after the failure
    /// handler had a chance to save state.
    ///
    /// # Panics
    ///
    /// Panics if the session is already closed.
    pub fn run<T, W, F>(&self, workload: F) -> std::result::Result<T, FailureRecord<W>>
    where
        F: FnOnce(&Self) -> std::result::Result<T, W>,
        W: Error + 'static,
    {
        self.context.handle.run(|| workload(self))
    }

    /// Create a client for a protocol adapter of this session, acting for
    /// the default tenant. The client is closed with the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AdapterDisabled`] if the adapter is not part of
    /// the infrastructure, or an error if its endpoint cannot be resolved or
    /// connected.
    pub fn connect_adapter(&self, kind: AdapterKind) -> Result<Arc<dyn ProtocolClient>> {
        if !kind.is_enabled(&self.infra) {
            return Err(SessionError::AdapterDisabled(kind));
        }
        let endpoint = self
            .context
            .backend
            .client
            .external_endpoint(&self.context.config.infra_namespace, &kind.resource_name())?;
        self.context.connect(&ClientRequest {
            role: ClientRole::Adapter(kind),
            endpoint,
            tls_versions: self.context.config.default_tls_versions.clone(),
            tenant: Some(self.tenant.tenant_id()),
        })
    }

    /// Tear down everything the session created.
    ///
    /// # Errors
    ///
    /// Returns the record of the teardown if any compensation failed. A
    /// second call does nothing.
    pub fn close(&self) -> std::result::Result<(), FailureRecord<SessionError>> {
        self.context.handle.close()
    }

    /// Like [`close`](Self::close), also returning the audit log when this
    /// call performed the teardown.
    pub fn close_with_audit(
        &self,
    ) -> (Option<FailureRecord<SessionError>>, Option<DrainAuditLog>) {
        self.context.handle.close_with_audit()
    }
}

impl std::fmt::Debug for TestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSession")
            .field("name", &self.name())
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

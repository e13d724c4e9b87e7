use std::sync::Arc;

use serde_json::{Value, json};
use testbed_core::{ResourceDescriptor, ResourceKey, TenantSpec};
use testbed_ledger::{CompensatingAction, FailureRecord, SessionHandle};
use tracing::{info, warn};

use super::SessionContext;
use super::resources;
use crate::SessionError;
use crate::provisioner::ProvisionRequest;
use crate::traits::{ClientRequest, ClientRole, ProtocolClient};

type ValueCustomizer = Box<dyn FnOnce(&mut Value)>;

/// Builds an IoT tenant inside a session's tenant namespace.
pub struct TenantBuilder {
    context: SessionContext,
    name: String,
    spec: TenantSpec,
    consumer_tls_versions: Option<Vec<String>>,
    await_ready: bool,
    create_namespace: bool,
    project: Option<ValueCustomizer>,
    endpoint: Option<ValueCustomizer>,
}

impl TenantBuilder {
    pub(crate) fn new(context: SessionContext, name: String, spec: TenantSpec) -> Self {
        Self {
            context,
            name,
            spec,
            consumer_tls_versions: None,
            await_ready: true,
            create_namespace: false,
            project: None,
            endpoint: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn spec<F>(mut self, customizer: F) -> Self
    where
        F: FnOnce(&mut TenantSpec),
    {
        customizer(&mut self.spec);
        self
    }

    /// TLS versions of the consumer client, instead of the session default.
    #[must_use]
    pub fn consumer_tls_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumer_tls_versions = Some(versions.into_iter().map(Into::into).collect());
        self
    }

    /// Whether to wait for the tenant to become ready. Tests expecting an
    /// invalid tenant turn this off.
    #[must_use]
    pub fn await_ready(mut self, enabled: bool) -> Self {
        self.await_ready = enabled;
        self
    }

    /// Also create the namespace, its messaging project and the downstream
    /// endpoint.
    #[must_use]
    pub fn create_namespace(mut self, enabled: bool) -> Self {
        self.create_namespace = enabled;
        self
    }

    #[must_use]
    pub fn project<F>(mut self, customizer: F) -> Self
    where
        F: FnOnce(&mut Value) + 'static,
    {
        self.project = Some(Box::new(customizer));
        self
    }

    #[must_use]
    pub fn endpoint<F>(mut self, customizer: F) -> Self
    where
        F: FnOnce(&mut Value) + 'static,
    {
        self.endpoint = Some(Box::new(customizer));
        self
    }

    /// Create the tenant and its consumer client in a scope of their own.
    ///
    /// The resulting instance is closed together with the session, unless it
    /// was closed before.
    ///
    /// # Errors
    ///
    /// Returns the failure of the tenant scope after it was rolled back, or
    /// [`SessionError::SessionClosed`] if the session was closed meanwhile.
    pub fn deploy(self) -> Result<TenantInstance, FailureRecord<SessionError>> {
        let Self {
            context,
            name,
            spec,
            consumer_tls_versions,
            await_ready,
            create_namespace,
            project,
            endpoint,
        } = self;
        let namespace = context.config.tenant_namespace.clone();
        let provisioner = &context.provisioner;

        let instance = context.scope.run(|ledger| {
            if create_namespace {
                provisioner.provision(
                    ProvisionRequest::new(resources::namespace(&namespace)?).await_ready(false),
                    ledger,
                )?;

                let mut project_spec = json!({});
                if let Some(customizer) = project {
                    customizer(&mut project_spec);
                }
                provisioner.provision(
                    ProvisionRequest::new(resources::messaging_project(&namespace, project_spec)?),
                    ledger,
                )?;

                let mut endpoint_spec = resources::downstream_endpoint_spec(context.config.platform);
                if let Some(customizer) = endpoint {
                    customizer(&mut endpoint_spec);
                }
                provisioner.provision(
                    ProvisionRequest::new(ResourceDescriptor::new(
                        resources::downstream_endpoint_key(&namespace)?,
                        endpoint_spec,
                    )),
                    ledger,
                )?;
            }

            let tenant = provisioner.provision(
                ProvisionRequest::new(resources::iot_tenant(&namespace, &name, &spec)?)
                    .await_ready(await_ready),
                ledger,
            )?;
            let key = tenant.key().clone();

            let downstream = resources::downstream_endpoint_key(&namespace)?;
            let endpoint = resources::resolve_amqps(context.backend.client.as_ref(), &downstream)?;
            let request = ClientRequest {
                role: ClientRole::Consumer,
                endpoint,
                tls_versions: consumer_tls_versions
                    .unwrap_or_else(|| context.config.default_tls_versions.clone()),
                tenant: Some(format!("{namespace}.{name}")),
            };
            info!(endpoint = %request.endpoint, tenant = %key, "creating consumer client");
            let consumer = context.backend.clients.connect(&request)?;
            let closing = Arc::clone(&consumer);
            ledger.defer_local("consumer client", move |_| closing.close());

            let handle = context.scope.session(format!("tenant {namespace}/{name}"), ledger);
            Ok(TenantInstance {
                handle: Arc::new(handle),
                key,
                spec,
                consumer,
            })
        })?;

        let closing = Arc::clone(&instance.handle);
        let action = CompensatingAction::local(format!("tenant {}", instance.key), move |_| {
            closing.close().map_err(SessionError::from)
        })
        .with_description("close tenant instance");

        if let Err(closed) = context.handle.push(action) {
            warn!(tenant = %instance.key, "session closed while the tenant was deployed");
            let mut record = FailureRecord::new(SessionError::from(closed));
            if let Err(teardown) = instance.close() {
                record.suppress(teardown);
            }
            return Err(record);
        }
        Ok(instance)
    }
}

impl std::fmt::Debug for TenantBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantBuilder")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("await_ready", &self.await_ready)
            .field("create_namespace", &self.create_namespace)
            .finish_non_exhaustive()
    }
}

/// A deployed tenant with its consumer client.
pub struct TenantInstance {
    handle: Arc<SessionHandle<SessionError>>,
    key: ResourceKey,
    spec: TenantSpec,
    consumer: Arc<dyn ProtocolClient>,
}

impl TenantInstance {
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.key.namespace
    }

    /// Identifier devices use to address the tenant.
    #[must_use]
    pub fn tenant_id(&self) -> String {
        format!("{}.{}", self.key.namespace, self.key.name)
    }

    #[must_use]
    pub fn spec(&self) -> &TenantSpec {
        &self.spec
    }

    #[must_use]
    pub fn consumer(&self) -> &Arc<dyn ProtocolClient> {
        &self.consumer
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<SessionHandle<SessionError>> {
        &self.handle
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Close the consumer and delete the tenant's resources. Closing the
    /// session later skips them.
    ///
    /// # Errors
    ///
    /// Returns the record of the teardown if any compensation failed.
    pub fn close(&self) -> Result<(), FailureRecord<SessionError>> {
        self.handle.close()
    }
}

impl std::fmt::Debug for TenantInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantInstance")
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

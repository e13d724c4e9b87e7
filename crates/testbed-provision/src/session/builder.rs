use std::sync::Arc;

use testbed_core::{
    AdapterKind, Condition, InfrastructureSpec, PollPolicy, SessionConfig, TenantSpec, random_name,
};
use testbed_ledger::{
    CleanupLedger, CompensatingAction, EnvironmentPolicy, FailureHandler, FailureRecord,
    TransactionalScope,
};
use tracing::{debug, info};

use super::resources;
use super::tenant::TenantBuilder;
use super::{Backend, SessionContext, TestSession};
use crate::provisioner::{ProvisionRequest, ProvisionedResource, Provisioner};
use crate::{Result, SessionError};

/// Access for pre-deploy processors: the specs before they are built, and
/// the ledger of the deployment so extra resources are cleaned up too.
pub struct PreDeployContext<'a> {
    pub infra: &'a mut InfrastructureSpec,
    pub tenant: &'a mut TenantSpec,
    namespace: &'a str,
    provisioner: &'a Provisioner,
    ledger: &'a mut CleanupLedger<SessionError>,
}

impl PreDeployContext<'_> {
    #[must_use]
    pub fn infra_namespace(&self) -> &str {
        self.namespace
    }

    pub fn add_cleanup(&mut self, action: CompensatingAction<SessionError>) {
        self.ledger.push(action);
    }

    /// Provision a resource owned by the deployment.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error; the deployment is rolled back.
    pub fn provision(&mut self, request: ProvisionRequest) -> Result<ProvisionedResource> {
        self.provisioner.provision(request, &mut *self.ledger)
    }
}

type PreDeploy = Box<dyn FnOnce(&mut PreDeployContext<'_>) -> Result<()>>;
type TenantCustomizer = Box<dyn FnOnce(TenantBuilder) -> TenantBuilder>;

/// Deploy a database for the device registry and point the infrastructure
/// at it.
pub fn with_default_services() -> impl FnOnce(&mut PreDeployContext<'_>) -> Result<()> {
    |context: &mut PreDeployContext<'_>| {
        let namespace = context.infra_namespace().to_string();
        context.provision(
            ProvisionRequest::new(resources::device_registry_backend(&namespace)?)
                .condition(Condition::named("Available")),
        )?;
        context.infra.services = Some(resources::default_services(&namespace));
        Ok(())
    }
}

/// Configures and deploys a [`TestSession`].
pub struct SessionBuilder {
    backend: Backend,
    config: SessionConfig,
    infra: InfrastructureSpec,
    tenant: TenantSpec,
    tenant_name: String,
    pre_deploy: Vec<PreDeploy>,
    handler: Option<Arc<dyn FailureHandler>>,
    default_tenant: Option<TenantCustomizer>,
}

impl SessionBuilder {
    /// A builder with the default infrastructure of the configured platform
    /// and a randomly named default tenant.
    #[must_use]
    pub fn new(backend: Backend, config: SessionConfig) -> Self {
        Self {
            infra: InfrastructureSpec::default_for(config.platform),
            tenant: TenantSpec::default(),
            tenant_name: random_name(),
            backend,
            config,
            pre_deploy: Vec::new(),
            handler: None,
            default_tenant: None,
        }
    }

    #[must_use]
    pub fn infra<F>(mut self, customizer: F) -> Self
    where
        F: FnOnce(&mut InfrastructureSpec),
    {
        customizer(&mut self.infra);
        self
    }

    #[must_use]
    pub fn tenant<F>(mut self, customizer: F) -> Self
    where
        F: FnOnce(&mut TenantSpec),
    {
        customizer(&mut self.tenant);
        self
    }

    #[must_use]
    pub fn tenant_name(mut self, name: impl Into<String>) -> Self {
        self.tenant_name = name.into();
        self
    }

    /// Enable exactly the listed adapters.
    #[must_use]
    pub fn adapters(mut self, enabled: &[AdapterKind]) -> Self {
        testbed_core::adapter::only(&mut self.infra, enabled);
        self
    }

    #[must_use]
    pub fn default_tls_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.default_tls_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Run `processor` before any resource is created.
    #[must_use]
    pub fn pre_deploy<F>(mut self, processor: F) -> Self
    where
        F: FnOnce(&mut PreDeployContext<'_>) -> Result<()> + 'static,
    {
        self.pre_deploy.push(Box::new(processor));
        self
    }

    /// Customize the builder of the default tenant.
    #[must_use]
    pub fn default_tenant<F>(mut self, customizer: F) -> Self
    where
        F: FnOnce(TenantBuilder) -> TenantBuilder + 'static,
    {
        self.default_tenant = Some(Box::new(customizer));
        self
    }

    #[must_use]
    pub fn failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: EnvironmentPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    #[must_use]
    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.config.poll = poll;
        self
    }

    /// Create the messaging infrastructure, the IoT infrastructure and the
    /// default tenant, in that order.
    ///
    /// If any step fails, the failure handler runs and everything created so
    /// far is deleted again.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing step, with cleanup failures
    /// attached.
    pub fn deploy(self) -> std::result::Result<TestSession, FailureRecord<SessionError>> {
        let Self {
            backend,
            config,
            mut infra,
            mut tenant,
            tenant_name,
            pre_deploy,
            handler,
            default_tenant,
        } = self;

        let handler = handler.unwrap_or_else(|| backend.default_handler());
        let scope = TransactionalScope::new(handler, config.policy);
        let provisioner = Provisioner::new(
            Arc::clone(&backend.client),
            Arc::clone(&backend.observer),
            config.poll,
        );
        let namespace = config.infra_namespace.clone();

        scope.run(|ledger| {
            for processor in pre_deploy {
                processor(&mut PreDeployContext {
                    infra: &mut infra,
                    tenant: &mut tenant,
                    namespace: &namespace,
                    provisioner: &provisioner,
                    ledger: &mut *ledger,
                })?;
            }

            let descriptor = resources::iot_infrastructure(&namespace, &infra)?;
            debug!(spec = %descriptor.spec, "final infrastructure configuration");

            provisioner.provision(
                ProvisionRequest::new(resources::messaging_infrastructure(&namespace)?),
                ledger,
            )?;
            provisioner.provision(
                ProvisionRequest::new(descriptor)
                    .assert_created(resources::assert_adapters_deployed(infra.clone()))
                    .assert_deleted(resources::assert_adapters_removed()),
                ledger,
            )?;

            let handle = Arc::new(scope.session(format!("{namespace}/default"), ledger));
            // until the default tenant is up, a failure must close the session
            ledger.adopt(Arc::clone(&handle));

            let context = SessionContext {
                handle,
                provisioner: provisioner.clone(),
                scope: scope.clone(),
                backend: backend.clone(),
                config: config.clone(),
            };

            let mut builder =
                TenantBuilder::new(context.clone(), tenant_name, tenant).create_namespace(true);
            if let Some(customizer) = default_tenant {
                builder = customizer(builder);
            }
            let tenant = builder.deploy()?;

            ledger.forget();
            info!(session = %context.handle.name(), tenant = %tenant.key(), "test session deployed");

            Ok(TestSession {
                context,
                infra,
                tenant,
            })
        })
    }

    /// Deploy, run `workload`, and close the session.
    ///
    /// # Errors
    ///
    /// Returns the deployment failure, or the workload failure with any
    /// teardown failure suppressed, or the teardown failure alone.
    pub fn run<T, F>(self, workload: F) -> std::result::Result<T, FailureRecord<SessionError>>
    where
        F: FnOnce(&TestSession) -> Result<T>,
    {
        let session = self.deploy()?;
        let outcome = session.run(workload);
        let closed = session.close();
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(teardown)) => Err(teardown),
            (Err(record), Ok(())) => Err(record),
            (Err(mut record), Err(teardown)) => {
                record.suppress(teardown);
                Err(record)
            }
        }
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("infra", &self.infra)
            .field("tenant_name", &self.tenant_name)
            .field("pre_deploy", &self.pre_deploy.len())
            .finish_non_exhaustive()
    }
}

use std::sync::Arc;

use serde_json::Value;
use testbed_core::{
    Condition, PollPolicy, Propagation, ResourceDescriptor, ResourceKey, ResourcePlan,
    ResourceSnapshot,
};
use testbed_ledger::{
    CleanupLedger, CompensatingAction, Diagnostics, FailureRecord, SessionHandle,
    TransactionalScope,
};
use tracing::{debug, info};

use crate::findings::Findings;
use crate::traits::{ReadinessObserver, ResourceClient};
use crate::wait::wait_until;
use crate::{Result, SessionError};

/// What an assertion gets to look at.
pub struct CheckContext<'a> {
    pub key: &'a ResourceKey,
    /// The resource as observed once ready. `None` after deletion.
    pub snapshot: Option<&'a ResourceSnapshot>,
    pub client: &'a dyn ResourceClient,
}

type Check = Box<dyn Fn(&CheckContext<'_>, &mut Findings) + Send + Sync>;

/// One resource to create, with the state to wait for and optional
/// assertions after construction and after deconstruction.
pub struct ProvisionRequest {
    descriptor: ResourceDescriptor,
    condition: Condition,
    await_ready: bool,
    after_create: Vec<Check>,
    after_delete: Vec<Check>,
}

impl ProvisionRequest {
    /// A request waiting for the `Ready` condition.
    #[must_use]
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            condition: Condition::ready(),
            await_ready: true,
            after_create: Vec::new(),
            after_delete: Vec::new(),
        }
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Skip waiting for the condition after creation.
    #[must_use]
    pub fn await_ready(mut self, enabled: bool) -> Self {
        self.await_ready = enabled;
        self
    }

    /// Assert on the resource once it is ready. Findings fail provisioning.
    #[must_use]
    pub fn assert_created<F>(mut self, check: F) -> Self
    where
        F: Fn(&CheckContext<'_>, &mut Findings) + Send + Sync + 'static,
    {
        self.after_create.push(Box::new(check));
        self
    }

    /// Assert once the resource is gone. Findings are reported as
    /// diagnostics of the cleanup, never as errors.
    #[must_use]
    pub fn assert_deleted<F>(mut self, check: F) -> Self
    where
        F: Fn(&CheckContext<'_>, &mut Findings) + Send + Sync + 'static,
    {
        self.after_delete.push(Box::new(check));
        self
    }

    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.descriptor.key
    }
}

/// A resource that reached its condition.
#[derive(Debug, Clone)]
pub struct ProvisionedResource {
    key: ResourceKey,
    condition: Condition,
    snapshot: Option<ResourceSnapshot>,
}

impl ProvisionedResource {
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// State observed right after provisioning.
    #[must_use]
    pub fn snapshot(&self) -> Option<&ResourceSnapshot> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> &Value {
        self.snapshot.as_ref().map_or(&Value::Null, |s| &s.status)
    }
}

/// Creates resources one at a time, registering their deletion first.
#[derive(Clone)]
pub struct Provisioner {
    client: Arc<dyn ResourceClient>,
    observer: Arc<dyn ReadinessObserver>,
    poll: PollPolicy,
}

impl Provisioner {
    #[must_use]
    pub fn new(
        client: Arc<dyn ResourceClient>,
        observer: Arc<dyn ReadinessObserver>,
        poll: PollPolicy,
    ) -> Self {
        Self {
            client,
            observer,
            poll,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    #[must_use]
    pub fn poll(&self) -> PollPolicy {
        self.poll
    }

    /// Create one resource and wait until it is usable.
    ///
    /// The compensating delete is appended to `ledger` before the create
    /// call, so it is pending even when creation or the wait fails. It stays
    /// in the ledger after success; the owner of the ledger decides when it
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns the client's error if creation fails, a provisioning error if
    /// the resource does not become ready, or [`SessionError::Assertion`] if a
    /// post-construction assertion fails.
    pub fn provision(
        &self,
        request: ProvisionRequest,
        ledger: &mut CleanupLedger<SessionError>,
    ) -> Result<ProvisionedResource> {
        let ProvisionRequest {
            descriptor,
            condition,
            await_ready,
            after_create,
            after_delete,
        } = request;
        let key = descriptor.key.clone();

        info!(resource = %key, "creating resource");
        ledger.push(self.delete_action(key.clone(), after_delete));

        self.client.create(&descriptor)?;

        if await_ready {
            wait_until(self.observer.as_ref(), &key, &condition, self.poll)?;
            info!(resource = %key, "resource is ready");
        }

        let snapshot = self.client.get(&key)?;

        if !after_create.is_empty() {
            debug!(resource = %key, "asserting construction");
            let Some(observed) = snapshot.as_ref() else {
                return Err(SessionError::NotFound(key));
            };
            let context = CheckContext {
                key: &key,
                snapshot: Some(observed),
                client: self.client.as_ref(),
            };
            let mut findings = Findings::new();
            for check in &after_create {
                check(&context, &mut findings);
            }
            findings.into_result(&key)?;
        }

        Ok(ProvisionedResource {
            key,
            condition,
            snapshot,
        })
    }

    fn delete_action(
        &self,
        key: ResourceKey,
        after_delete: Vec<Check>,
    ) -> CompensatingAction<SessionError> {
        let client = Arc::clone(&self.client);
        let observer = Arc::clone(&self.observer);
        let poll = self.poll;
        let description = format!("delete {key} and wait until it is gone");

        CompensatingAction::persistent(key.to_string(), move |diagnostics: &mut Diagnostics| {
            info!(resource = %key, "deleting resource");
            match client.delete(&key, Propagation::Foreground) {
                Ok(()) => {}
                Err(SessionError::NotFound(_)) => {
                    debug!(resource = %key, "resource did not exist");
                }
                Err(error) => return Err(error),
            }

            wait_until(observer.as_ref(), &key, &Condition::Gone, poll)?;
            debug!(resource = %key, "resource is gone");

            if !after_delete.is_empty() {
                debug!(resource = %key, "asserting deconstruction");
                let context = CheckContext {
                    key: &key,
                    snapshot: None,
                    client: client.as_ref(),
                };
                let mut findings = Findings::new();
                for check in &after_delete {
                    check(&context, &mut findings);
                }
                for finding in findings {
                    diagnostics.report(finding);
                }
            }
            Ok(())
        })
        .with_description(description)
    }

    /// Provision every resource of `plan` in file order inside one scope.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first resource that could not be
    /// provisioned, after rolling back the ones before it.
    pub fn provision_plan(
        &self,
        plan: &ResourcePlan,
        scope: &TransactionalScope,
    ) -> std::result::Result<SessionHandle<SessionError>, FailureRecord<SessionError>> {
        scope.run(|ledger| {
            for resource in &plan.resources {
                let request = ProvisionRequest::new(resource.descriptor()?)
                    .condition(resource.condition())
                    .await_ready(resource.await_ready);
                self.provision(request, ledger)?;
            }
            Ok(scope.session(plan.display_name(), ledger))
        })
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

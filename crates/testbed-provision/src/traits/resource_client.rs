use testbed_core::{Endpoint, Propagation, ResourceDescriptor, ResourceKey, ResourceSnapshot};

use crate::Result;

/// Access to the cluster API that owns the provisioned resources.
///
/// Implementations must be safe for concurrent independent calls, although
/// sessions issue them one at a time.
pub trait ResourceClient: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the API rejects the resource.
    fn create(&self, resource: &ResourceDescriptor) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`](crate::SessionError::NotFound) if the
    /// resource does not exist, or another error if the request fails.
    fn delete(&self, key: &ResourceKey, propagation: Propagation) -> Result<()>;

    /// Current state of a resource, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn get(&self, key: &ResourceKey) -> Result<Option<ResourceSnapshot>>;

    /// Externally reachable endpoint of a service (route, load balancer or
    /// node port).
    ///
    /// # Errors
    ///
    /// Returns an error if the service is not exposed.
    fn external_endpoint(&self, namespace: &str, name: &str) -> Result<Endpoint>;
}

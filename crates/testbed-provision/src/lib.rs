//! Provisioning of IoT test environments with ordered teardown.
//!
//! A [`Provisioner`] creates one resource at a time, registering its
//! compensating delete first. [`TestSession`] builds on it to deploy an IoT
//! infrastructure and a default tenant, and tears everything down in reverse
//! when the session closes.

mod error;
mod findings;
pub mod providers;
mod provisioner;
mod save_state;
pub mod session;
pub mod traits;
mod wait;

#[cfg(test)]
pub mod mocks;

pub use error::{Result, SessionError};
pub use findings::Findings;
pub use providers::{Fault, SimulatedCluster};
pub use provisioner::{CheckContext, ProvisionRequest, ProvisionedResource, Provisioner};
pub use save_state::SaveStateHandler;
pub use session::{
    Backend, PreDeployContext, SessionBuilder, TenantBuilder, TenantInstance, TestSession,
    with_default_services,
};
pub use wait::wait_until;

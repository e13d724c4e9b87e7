pub mod adapter;
mod config;
pub mod error;
mod infra;
mod plan;
mod poll;
pub mod resource;

pub use adapter::{AdapterConfig, AdapterKind, AdaptersConfig};
pub use config::SessionConfig;
pub use error::*;
pub use infra::{
    CertificateStrategy, Endpoint, EndpointPort, InfrastructureSpec, LoggingConfig, Platform,
    TenantSpec, random_name,
};
pub use plan::{PlannedResource, ResourcePlan};
pub use poll::PollPolicy;
pub use resource::*;

use std::fmt;
use std::sync::Arc;

use testbed_core::{AdapterKind, Endpoint};

use crate::Result;

/// What a protocol client is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientRole {
    /// Consumes telemetry and events of a tenant from the messaging endpoint.
    Consumer,
    /// Sends device traffic to a protocol adapter.
    Adapter(AdapterKind),
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consumer => write!(f, "consumer"),
            Self::Adapter(kind) => write!(f, "{kind} adapter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub role: ClientRole,
    pub endpoint: Endpoint,
    /// Empty means the client's own defaults.
    pub tls_versions: Vec<String>,
    pub tenant: Option<String>,
}

/// A connected wire-protocol client.
pub trait ProtocolClient: Send + Sync {
    fn role(&self) -> ClientRole;

    fn endpoint(&self) -> &Endpoint;

    /// # Errors
    ///
    /// Returns an error if the connection cannot be shut down cleanly.
    fn close(&self) -> Result<()>;
}

/// Creates protocol clients for endpoints resolved by a session.
pub trait ClientFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    fn connect(&self, request: &ClientRequest) -> Result<Arc<dyn ProtocolClient>>;
}

mod protocol_client;
mod readiness;
mod resource_client;
mod state_collector;

pub use protocol_client::{ClientFactory, ClientRequest, ClientRole, ProtocolClient};
pub use readiness::{ReadinessObserver, SnapshotObserver};
pub use resource_client::ResourceClient;
pub use state_collector::StateCollector;

mod simulated;

pub use simulated::{ClusterEvent, Controller, Fault, SimulatedCluster};

//! Connection management for Hazelcast client.

mod address;
mod backoff;
mod connection;
mod failover;
mod manager;
mod provider;

pub use address::{Address, DEFAULT_PORTS};
pub use connection::{Connection, ConnectionId};
pub use failover::{CandidateCluster, FailoverPlan};
pub use manager::{ConnectionEvent, ConnectionListener, ConnectionManager};
pub use provider::{AddressProvider, StaticAddressProvider};

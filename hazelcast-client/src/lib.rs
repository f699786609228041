//! Async Rust client connectivity layer for [Hazelcast](https://hazelcast.com/).
//!
//! This crate connects to a Hazelcast 5.x cluster over the
//! [Hazelcast Open Binary Protocol](https://github.com/hazelcast/hazelcast-client-protocol)
//! and keeps those connections healthy. It is built on [Tokio](https://tokio.rs/).
//!
//! The pieces are:
//!
//! - [`ConnectionManager`]: opens and authenticates connections according to
//!   the [`RoutingMode`], heartbeats them, reconnects with backoff and fails
//!   over between clusters.
//! - The listener registry behind [`HazelcastClient::register_listener`]:
//!   installs each registration on every live connection and replays it on
//!   every connection that comes up later.
//! - The event dispatcher: decodes server-pushed events into [`ClientEvent`]
//!   and hands them to the registered [`EventHandler`].
//! - [`ClusterService`] and [`PartitionService`]: the member list and
//!   partition table pushed by the cluster.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hazelcast_client::{ClientConfig, HazelcastClient, InvocationTarget};
//! use hazelcast_client::core::protocol::codecs::client::ClientPing;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .cluster_name("dev")
//!         .build()?;
//!     let client = HazelcastClient::new(config).await?;
//!
//!     client.invoke::<ClientPing>(&(), InvocationTarget::Any).await?;
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! ```rust,no_run
//! use hazelcast_client::{ClientConfig, ReconnectMode, RoutingMode};
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .cluster_name("production")
//!     .network(|n| n
//!         .add_address("10.0.0.1:5701")
//!         .add_address("10.0.0.2")
//!         .routing_mode(RoutingMode::AllMembers))
//!     .connection_strategy(|s| s.reconnect_mode(ReconnectMode::On))
//!     .retry(|r| r
//!         .initial_backoff(Duration::from_millis(100))
//!         .max_backoff(Duration::from_secs(30))
//!         .multiplier(2.0)
//!         .cluster_connect_timeout(Duration::from_secs(120)))
//!     .credentials("admin", "secret")
//!     .build()?;
//! # Ok::<(), hazelcast_client::ConfigError>(())
//! ```
//!
//! # Blue/green failover
//!
//! [`ClientFailoverConfig`] lists alternative clusters. When the client can
//! no longer reach the current cluster it tries the next one, round robin,
//! each at most `try_count` times.

#![warn(missing_docs)]

mod client;
pub mod cluster;
pub mod config;
pub mod connection;
mod context;
mod invocation;
pub mod listener;

pub use client::HazelcastClient;
pub use cluster::{ClusterService, Member, MemberEvent, MemberEventType, PartitionService};
pub use config::{
    ClientConfig, ClientConfigBuilder, ClientFailoverConfig, ClientFailoverConfigBuilder,
    ConfigError, ConnectionStrategyConfig, ConnectionStrategyConfigBuilder, Credentials,
    MultiMemberStrategy, NetworkConfig, NetworkConfigBuilder, ReconnectMode, RetryConfig,
    RetryConfigBuilder, RoutingMode, SecurityConfig, SecurityConfigBuilder,
};
pub use connection::{
    Address, AddressProvider, CandidateCluster, Connection, ConnectionEvent, ConnectionId,
    ConnectionListener, ConnectionManager, FailoverPlan, StaticAddressProvider,
};
pub use context::ClientContext;
pub use hazelcast_core as core;
pub use invocation::{InvocationService, InvocationTarget};
pub use listener::{
    ClientEvent, EventHandler, LifecycleEvent, ListenerMessageCodec, MapInvalidationListenerCodec,
    ReplicatedMapNearCacheListenerCodec, TopicListenerCodec,
};

//! Hazelcast client entry point.

use std::sync::{Arc, Weak};

use hazelcast_core::protocol::Operation;
use hazelcast_core::{HazelcastError, Result};
use tokio::sync::broadcast;
use tracing::instrument;
use uuid::Uuid;

use crate::cluster::{ClusterService, Member, MemberEvent, PartitionService};
use crate::config::{ClientConfig, ClientFailoverConfig};
use crate::connection::{
    CandidateCluster, ConnectionEvent, ConnectionId, ConnectionListener, ConnectionManager,
};
use crate::context::ClientContext;
use crate::invocation::{InvocationService, InvocationTarget};
use crate::listener::{EventHandler, LifecycleEvent, ListenerMessageCodec, ListenerService};

/// The main entry point for connecting to a Hazelcast cluster.
///
/// A client owns a [`ConnectionManager`] and a listener registry. Listener
/// registrations survive reconnection: they are installed again on every
/// connection that comes up. Clones share the same connections.
///
/// # Example
///
/// ```no_run
/// use hazelcast_client::{ClientConfig, ClientEvent, HazelcastClient, TopicListenerCodec};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder()
///         .cluster_name("dev")
///         .build()?;
///
///     let client = HazelcastClient::new(config).await?;
///     let registration = client
///         .register_listener(
///             Arc::new(TopicListenerCodec::new("news")),
///             |event: ClientEvent| println!("{:?}", event),
///         )
///         .await?;
///
///     client.deregister_listener(registration).await?;
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HazelcastClient {
    manager: Arc<ConnectionManager>,
    listeners: Arc<ListenerService>,
    invocation: InvocationService,
    context: Option<Weak<ClientContext>>,
}

impl HazelcastClient {
    /// Creates a new client and connects to the Hazelcast cluster.
    ///
    /// # Errors
    ///
    /// Returns `UnableToConnect` if no member accepted a connection within
    /// the cluster-connect timeout, unless async start is enabled.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::start(ConnectionManager::new(config), None).await
    }

    /// Creates a client that fails over between several clusters.
    pub async fn with_failover(failover_config: ClientFailoverConfig) -> Result<Self> {
        Self::start(ConnectionManager::with_failover(failover_config)?, None).await
    }

    /// Creates a client over explicit candidate clusters.
    pub async fn with_candidates(candidates: Vec<CandidateCluster>, try_count: u32) -> Result<Self> {
        Self::start(ConnectionManager::with_candidates(candidates, try_count)?, None).await
    }

    /// Creates a client registered in `context`.
    pub async fn new_in_context(config: ClientConfig, context: &Arc<ClientContext>) -> Result<Self> {
        Self::start(ConnectionManager::new(config), Some(context)).await
    }

    async fn start(
        manager: Arc<ConnectionManager>,
        context: Option<&Arc<ClientContext>>,
    ) -> Result<Self> {
        let listeners = ListenerService::start(
            manager.routing_mode(),
            manager.config().invocation_timeout(),
        );
        manager.add_connection_listener(Arc::clone(&listeners) as Arc<dyn ConnectionListener>);

        let client = Self {
            invocation: InvocationService::new(Arc::clone(&manager)),
            manager,
            listeners,
            context: context.map(Arc::downgrade),
        };

        if let Err(e) = client.manager.start().await {
            client.listeners.shutdown();
            return Err(e);
        }
        if let Some(context) = context {
            context.register(client.clone());
        }

        tracing::info!(
            client = %client.name(),
            cluster = %client.cluster_name(),
            "client started"
        );
        Ok(client)
    }

    /// Returns the client's instance name.
    pub fn name(&self) -> &str {
        self.manager.client_name()
    }

    /// Returns the UUID this client presents to members.
    pub fn client_uuid(&self) -> Uuid {
        self.manager.client_uuid()
    }

    /// Returns the name of the cluster the client currently targets.
    pub fn cluster_name(&self) -> &str {
        self.manager.current_cluster_name()
    }

    /// Returns the configuration of the cluster the client currently targets.
    pub fn config(&self) -> &ClientConfig {
        self.manager.config()
    }

    /// Returns the connection manager.
    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Returns the member list service.
    pub fn cluster_service(&self) -> &Arc<ClusterService> {
        self.manager.cluster_service()
    }

    /// Returns the partition table service.
    pub fn partition_service(&self) -> &Arc<PartitionService> {
        self.manager.partition_service()
    }

    /// Returns the invocation service.
    pub fn invocation_service(&self) -> &InvocationService {
        &self.invocation
    }

    /// Sends one operation and decodes its response.
    pub async fn invoke<Op: Operation>(
        &self,
        request: &Op::Request,
        target: InvocationTarget,
    ) -> Result<Op::Response> {
        self.invocation.invoke::<Op>(request, target).await
    }

    /// Registers a listener on every live connection and every later one.
    ///
    /// Returns the registration id used to deregister it.
    #[instrument(
        name = "client.register_listener",
        skip(self, codec, handler),
        fields(client = %self.name())
    )]
    pub async fn register_listener(
        &self,
        codec: Arc<dyn ListenerMessageCodec>,
        handler: impl EventHandler + 'static,
    ) -> Result<Uuid> {
        self.ensure_running()?;
        let id = self.listeners.register(codec, Arc::new(handler)).await?;
        tracing::debug!(registration = %id, "registered listener");
        Ok(id)
    }

    /// Removes a registration. Returns false if it did not exist.
    #[instrument(
        name = "client.deregister_listener",
        skip(self),
        fields(client = %self.name())
    )]
    pub async fn deregister_listener(&self, registration_id: Uuid) -> Result<bool> {
        self.ensure_running()?;
        self.listeners.deregister(registration_id).await
    }

    /// Returns the connections a registration is currently installed on.
    pub async fn listener_installations(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<Vec<ConnectionId>>> {
        self.listeners.installed_connections(registration_id).await
    }

    /// Adds a connection listener.
    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.manager.add_connection_listener(listener);
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.manager.subscribe_lifecycle()
    }

    /// Subscribes to cluster membership events.
    pub fn subscribe_membership(&self) -> broadcast::Receiver<MemberEvent> {
        self.manager.cluster_service().subscribe()
    }

    /// Subscribes to connection events.
    pub fn subscribe_connections(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.manager.subscribe()
    }

    /// Returns the current list of known cluster members.
    pub fn members(&self) -> Vec<Member> {
        self.manager.cluster_service().members()
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.manager.connection_count()
    }

    /// Returns true until the client is shut down.
    pub fn is_running(&self) -> bool {
        !self.manager.is_shutdown()
    }

    /// Shuts down the client and closes all connections. Idempotent.
    pub async fn shutdown(&self) {
        tracing::info!(client = %self.name(), "shutting down Hazelcast client");
        self.listeners.shutdown();
        self.manager.shutdown().await;
        if let Some(context) = self.context.as_ref().and_then(Weak::upgrade) {
            context.deregister(&self.client_uuid());
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(HazelcastError::ClientNotActive("client closed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfigBuilder;
    use std::time::Duration;

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HazelcastClient>();
    }

    #[tokio::test]
    async fn test_new_fails_without_cluster() {
        let config = ClientConfigBuilder::new()
            .network(|n| n.add_address("127.0.0.1:1"))
            .retry(|r| r.cluster_connect_timeout(Duration::from_millis(50)))
            .build()
            .unwrap();

        let err = HazelcastClient::new(config).await.unwrap_err();
        assert!(matches!(err, HazelcastError::UnableToConnect(_)));
    }
}

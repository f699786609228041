//! Connection pool management and lifecycle handling.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hazelcast_core::protocol::codecs::client::{
    AuthenticationCustomRequest, AuthenticationRequest, AuthenticationResponse,
    ClientAuthentication, ClientAuthenticationCustom, ClientPing, AUTHENTICATED,
    CREDENTIALS_FAILED, NOT_ALLOWED_IN_CLUSTER, SERIALIZATION_VERSION_MISMATCH,
};
use hazelcast_core::protocol::Operation;
use hazelcast_core::{ClientMessage, HazelcastError, Result};
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::instrument;
use uuid::Uuid;

use super::backoff::WaitStrategy;
use super::connection::{Connection, ConnectionId};
use super::failover::{CandidateCluster, FailoverPlan};
use super::Address;
use crate::cluster::{ClusterService, ClusterViewListener, Member, PartitionService};
use crate::config::{
    ClientConfig, ClientFailoverConfig, Credentials, MultiMemberStrategy, ReconnectMode,
    RoutingMode,
};
use crate::listener::{EventDispatcher, LifecycleBroadcaster, LifecycleEvent};

/// Serialization version announced during authentication.
const SERIALIZATION_VERSION: u8 = 1;
const CLIENT_TYPE: &str = "RST";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Member attribute carrying the member's cluster name.
const CLUSTER_NAME_ATTRIBUTE: &str = "cluster.name";
const TOPOLOGY_INTERVAL: Duration = Duration::from_secs(1);

const STATE_INITIAL: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_SHUTDOWN: u8 = 2;

/// Receives connection-added and connection-removed notifications.
///
/// Callbacks run on the manager's tasks and must not block.
pub trait ConnectionListener: Send + Sync {
    /// A connection became live.
    fn connection_added(&self, connection: &Arc<Connection>);
    /// A live connection was removed.
    fn connection_removed(&self, connection: &Arc<Connection>);
}

/// Events emitted during connection lifecycle.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connection authenticated and became live.
    Connected {
        /// The connection identifier.
        id: ConnectionId,
        /// The address that was dialed.
        address: Address,
        /// The member behind the connection.
        member_uuid: Uuid,
    },
    /// A live connection was removed.
    Disconnected {
        /// The connection identifier.
        id: ConnectionId,
        /// The address that was dialed.
        address: Address,
        /// Why the connection closed, if known.
        reason: Option<String>,
    },
    /// A connection attempt failed.
    AttemptFailed {
        /// The address that was dialed.
        address: Address,
        /// The error from the attempt.
        error: String,
    },
}

/// Removes an address from the in-flight set when the attempt ends,
/// including when the attempt is cancelled.
struct PendingConnect<'a> {
    pending: &'a Mutex<HashSet<Address>>,
    address: Address,
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.address);
    }
}

/// Owns every connection of one client.
///
/// The manager connects to the selected candidate cluster, keeps the set of
/// connections the routing mode asks for, authenticates each connection,
/// tracks liveness with heartbeats and reconnects or fails over when the
/// last connection is lost. Registered [`ConnectionListener`]s are told
/// about every connection that becomes live and every one that is removed.
pub struct ConnectionManager {
    self_ref: Weak<ConnectionManager>,
    client_uuid: Uuid,
    client_name: String,
    candidates: Vec<CandidateCluster>,
    try_count: u32,
    failover: bool,
    current_candidate: AtomicUsize,
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
    pending_connects: Mutex<HashSet<Address>>,
    cluster: Arc<ClusterService>,
    partitions: Arc<PartitionService>,
    cluster_id: Mutex<Option<Uuid>>,
    listeners: RwLock<Vec<Arc<dyn ConnectionListener>>>,
    lifecycle: LifecycleBroadcaster,
    event_sender: broadcast::Sender<ConnectionEvent>,
    dispatcher: EventDispatcher,
    closed_tx: mpsc::UnboundedSender<Arc<Connection>>,
    closed_rx: Mutex<Option<mpsc::UnboundedReceiver<Arc<Connection>>>>,
    state: AtomicU8,
    reconnecting: AtomicBool,
    connected: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    connection_attempts: AtomicU64,
    candidate_attempts: AtomicU64,
}

impl ConnectionManager {
    /// Creates a manager for a single cluster.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Self::build(vec![CandidateCluster::from_config(config)], 1, false)
    }

    /// Creates a manager that fails over between the configured clusters.
    pub fn with_failover(failover_config: ClientFailoverConfig) -> Result<Arc<Self>> {
        let candidates = failover_config
            .configs()
            .iter()
            .cloned()
            .map(CandidateCluster::from_config)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Err(HazelcastError::Configuration(
                "failover requires at least one client configuration".to_string(),
            ));
        }
        Ok(Self::build(candidates, failover_config.try_count().max(1), true))
    }

    /// Creates a manager over explicit candidates, for custom address providers.
    ///
    /// More than one candidate enables failover.
    pub fn with_candidates(candidates: Vec<CandidateCluster>, try_count: u32) -> Result<Arc<Self>> {
        if candidates.is_empty() {
            return Err(HazelcastError::Configuration(
                "at least one candidate cluster is required".to_string(),
            ));
        }
        if try_count == 0 {
            return Err(HazelcastError::Configuration(
                "try_count must be at least 1".to_string(),
            ));
        }
        let failover = candidates.len() > 1;
        Ok(Self::build(candidates, try_count, failover))
    }

    fn build(candidates: Vec<CandidateCluster>, try_count: u32, failover: bool) -> Arc<Self> {
        let primary = Arc::clone(candidates[0].config());
        let client_name = primary
            .instance_name()
            .map(str::to_owned)
            .unwrap_or_else(next_client_name);

        let cluster = Arc::new(ClusterService::new());
        let partitions = Arc::new(PartitionService::new());
        let view_listener: Arc<dyn ConnectionListener> = Arc::new(ClusterViewListener::new(
            Arc::clone(&cluster),
            Arc::clone(&partitions),
            primary.invocation_timeout(),
        ));

        let (dispatcher, dispatcher_task) = EventDispatcher::start();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let (event_sender, _) = broadcast::channel(64);
        let (connected, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            client_uuid: Uuid::new_v4(),
            client_name,
            candidates,
            try_count,
            failover,
            current_candidate: AtomicUsize::new(0),
            connections: RwLock::new(HashMap::new()),
            pending_connects: Mutex::new(HashSet::new()),
            cluster,
            partitions,
            cluster_id: Mutex::new(None),
            listeners: RwLock::new(vec![view_listener]),
            lifecycle: LifecycleBroadcaster::new(),
            event_sender,
            dispatcher,
            closed_tx,
            closed_rx: Mutex::new(Some(closed_rx)),
            state: AtomicU8::new(STATE_INITIAL),
            reconnecting: AtomicBool::new(false),
            connected,
            shutdown,
            tasks: Mutex::new(vec![dispatcher_task]),
            connection_attempts: AtomicU64::new(0),
            candidate_attempts: AtomicU64::new(0),
        })
    }

    /// Returns the UUID this client presents to members.
    pub fn client_uuid(&self) -> Uuid {
        self.client_uuid
    }

    /// Returns the client's instance name.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Returns the configuration of the cluster currently selected.
    pub fn config(&self) -> &Arc<ClientConfig> {
        self.current().config()
    }

    fn current(&self) -> &CandidateCluster {
        let index = self.current_candidate.load(Ordering::Acquire);
        &self.candidates[index % self.candidates.len()]
    }

    /// Returns the index of the cluster currently selected.
    pub fn current_candidate_index(&self) -> usize {
        self.current_candidate.load(Ordering::Acquire)
    }

    /// Returns the name of the cluster currently selected.
    pub fn current_cluster_name(&self) -> &str {
        self.current().cluster_name()
    }

    /// Returns the id of the cluster the client last connected to.
    pub fn cluster_id(&self) -> Option<Uuid> {
        *self.cluster_id.lock()
    }

    /// Returns true if the manager fails over between clusters.
    pub fn has_failover(&self) -> bool {
        self.failover
    }

    /// Returns the routing mode.
    pub fn routing_mode(&self) -> RoutingMode {
        self.config().network().routing_mode()
    }

    /// Returns the reconnect mode.
    pub fn reconnect_mode(&self) -> ReconnectMode {
        self.candidates[0].config().connection_strategy().reconnect_mode()
    }

    /// Returns the member list service.
    pub fn cluster_service(&self) -> &Arc<ClusterService> {
        &self.cluster
    }

    /// Returns the partition table service.
    pub fn partition_service(&self) -> &Arc<PartitionService> {
        &self.partitions
    }

    /// Subscribes to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_sender.subscribe()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Returns the most recent lifecycle event.
    pub fn last_lifecycle_event(&self) -> Option<LifecycleEvent> {
        self.lifecycle.last()
    }

    /// Adds a connection listener. Adding the same listener twice delivers
    /// every notification twice.
    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns true until shutdown begins.
    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_ACTIVE
    }

    /// Returns true once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_SHUTDOWN
    }

    /// Returns true if at least one connection is live.
    pub fn is_connected(&self) -> bool {
        !self.connections.read().is_empty()
    }

    /// Returns the live connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns the live connection to a member.
    pub fn connection_for_member(&self, member_uuid: &Uuid) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .get(member_uuid)
            .filter(|connection| connection.is_alive())
            .cloned()
    }

    /// Returns a random live connection.
    pub fn random_connection(&self) -> Option<Arc<Connection>> {
        let connections: Vec<_> = self
            .connections
            .read()
            .values()
            .filter(|connection| connection.is_alive())
            .cloned()
            .collect();
        connections.choose(&mut rand::thread_rng()).cloned()
    }

    /// Waits until a connection is live. Returns false on timeout.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let mut connected = self.connected.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, connected.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Number of connection attempts made so far.
    pub fn connection_attempts(&self) -> u64 {
        self.connection_attempts.load(Ordering::Relaxed)
    }

    /// Number of candidate cluster attempts made so far.
    pub fn candidate_attempts(&self) -> u64 {
        self.candidate_attempts.load(Ordering::Relaxed)
    }

    /// Connects to the cluster and starts background maintenance.
    ///
    /// With async start the connection is made in the background and this
    /// returns immediately. Otherwise a failure to reach any cluster shuts
    /// the manager down and is returned.
    #[instrument(
        name = "connection_manager.start",
        skip(self),
        fields(cluster = %self.current_cluster_name(), client = %self.client_name)
    )]
    pub async fn start(&self) -> Result<()> {
        let Some(manager) = self.self_ref.upgrade() else {
            return Err(not_active());
        };
        match self.state.compare_exchange(
            STATE_INITIAL,
            STATE_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_ACTIVE) => return Ok(()),
            Err(_) => return Err(not_active()),
        }

        self.lifecycle.fire(LifecycleEvent::Starting);
        manager.spawn_background_tasks();

        if self.candidates[0].config().connection_strategy().async_start() {
            let background = Arc::clone(&manager);
            self.spawn_tracked(async move {
                if let Err(e) = background.connect_and_settle().await {
                    tracing::error!(error = %e, "async start failed to reach any cluster");
                    background.spawn_shutdown();
                }
            });
        } else if let Err(e) = manager.connect_and_settle().await {
            tracing::error!(error = %e, "failed to connect to any cluster");
            self.shutdown().await;
            return Err(e);
        }

        self.lifecycle.fire(LifecycleEvent::Started);
        Ok(())
    }

    /// Closes every connection and stops all background work.
    ///
    /// Idempotent; pending requests fail with `ClientNotActive`.
    #[instrument(
        name = "connection_manager.shutdown",
        skip(self),
        fields(cluster = %self.current_cluster_name(), client = %self.client_name)
    )]
    pub async fn shutdown(&self) {
        if self.state.swap(STATE_SHUTDOWN, Ordering::AcqRel) == STATE_SHUTDOWN {
            return;
        }
        self.lifecycle.fire(LifecycleEvent::ShuttingDown);
        let _ = self.shutdown.send(true);

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let connections: Vec<_> = self
            .connections
            .write()
            .drain()
            .map(|(_, connection)| connection)
            .collect();
        tracing::debug!(connections = connections.len(), "closing connections");
        for connection in &connections {
            connection.close_for_shutdown();
        }
        for connection in &connections {
            self.fire_connection_removed(connection);
        }
        self.connected.send_replace(false);

        self.lifecycle.fire(LifecycleEvent::Shutdown);
        tracing::info!("connection manager shut down");
    }

    fn spawn_tracked(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(task);
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        if self.state.load(Ordering::Acquire) == STATE_SHUTDOWN {
            handle.abort();
        } else {
            tasks.push(handle);
        }
    }

    /// Runs shutdown on its own task so aborting tracked tasks cannot cancel it.
    fn spawn_shutdown(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.shutdown().await });
    }

    fn spawn_background_tasks(self: &Arc<Self>) {
        if let Some(closed) = self.closed_rx.lock().take() {
            self.spawn_tracked(run_closed_handler(Arc::downgrade(self), closed));
        }
        self.spawn_tracked(run_heartbeat(
            Arc::downgrade(self),
            self.config().network().heartbeat_interval(),
        ));
        self.spawn_tracked(run_topology(
            Arc::downgrade(self),
            self.cluster.subscribe(),
        ));
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(not_active())
        }
    }

    /// Connects to the cluster, guarding against a concurrent reconnect.
    async fn connect_and_settle(self: &Arc<Self>) -> Result<()> {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.connect_to_cluster().await;
        self.reconnecting.store(false, Ordering::Release);

        // The last connection may have gone while the flag was still set.
        if result.is_ok() && self.is_active() && !self.is_connected() {
            self.spawn_reconnect();
        }
        result
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        self.spawn_tracked(async move {
            match manager.connect_and_settle().await {
                Ok(()) => {}
                Err(e) if manager.is_active() => {
                    tracing::error!(error = %e, "failed to reconnect, shutting down");
                    manager.spawn_shutdown();
                }
                Err(_) => {}
            }
        });
    }

    /// Tries the candidate clusters in failover order until one accepts a
    /// connection.
    #[instrument(name = "connection_manager.connect_to_cluster", skip(self))]
    async fn connect_to_cluster(self: &Arc<Self>) -> Result<()> {
        let start = self.current_candidate.load(Ordering::Acquire);
        for index in FailoverPlan::new(self.candidates.len(), self.try_count, start) {
            self.ensure_active()?;
            if index != self.current_candidate.load(Ordering::Acquire) {
                self.switch_candidate(index);
            }
            self.candidate_attempts.fetch_add(1, Ordering::Relaxed);

            if self.connect_to_candidate(index).await? {
                return Ok(());
            }
            tracing::warn!(
                cluster = %self.candidates[index].cluster_name(),
                "unable to connect to cluster"
            );
        }
        Err(HazelcastError::UnableToConnect(
            "Unable to connect to any cluster.".to_string(),
        ))
    }

    fn switch_candidate(&self, index: usize) {
        tracing::info!(
            from = %self.current_cluster_name(),
            to = %self.candidates[index].cluster_name(),
            "switching cluster"
        );
        self.current_candidate.store(index, Ordering::Release);
        self.cluster.reset();
        self.partitions.reset();
    }

    /// Attempts every address of one candidate until one connection is live
    /// or the cluster-connect timeout passes. Returns false in the latter
    /// case or once every address rejected the client.
    async fn connect_to_candidate(self: &Arc<Self>, index: usize) -> Result<bool> {
        let candidate = &self.candidates[index];
        let mut wait = WaitStrategy::new(candidate.config().retry());
        let mut shutdown = self.shutdown.subscribe();
        let mut rejected: HashSet<Address> = HashSet::new();

        loop {
            if self.is_connected() {
                return Ok(true);
            }
            let addresses: Vec<Address> = self
                .candidate_addresses(candidate)
                .await
                .into_iter()
                .filter(|address| !rejected.contains(address))
                .collect();
            if addresses.is_empty() && !rejected.is_empty() {
                tracing::warn!(
                    cluster = %candidate.cluster_name(),
                    "every address rejected the client"
                );
                return Ok(false);
            }

            for address in addresses {
                self.ensure_active()?;
                match self.connect(index, address.clone()).await {
                    Ok(_) => return Ok(true),
                    Err(e @ HazelcastError::ClientNotActive(_)) => return Err(e),
                    Err(e) if e.is_authentication() => {
                        tracing::warn!(address = %address, error = %e, "authentication rejected");
                        rejected.insert(address);
                    }
                    Err(e) => {
                        tracing::warn!(address = %address, error = %e, "connection attempt failed");
                    }
                }
            }
            if self.is_connected() {
                return Ok(true);
            }

            tokio::select! {
                more = wait.sleep() => {
                    if !more {
                        return Ok(false);
                    }
                }
                _ = shutdown.wait_for(|stopped| *stopped) => return Err(not_active()),
            }
        }
    }

    /// Addresses of known members first, then the provider's addresses.
    async fn candidate_addresses(&self, candidate: &CandidateCluster) -> Vec<Address> {
        let shuffle = candidate.config().network().shuffle_addresses();
        let mut known: Vec<Address> = self
            .cluster
            .members()
            .iter()
            .map(|member| member.address().clone())
            .collect();
        let mut provided = match candidate.provider().load_addresses().await {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::warn!(cluster = %candidate.cluster_name(), error = %e, "failed to load addresses");
                Vec::new()
            }
        };
        if shuffle {
            let mut rng = rand::thread_rng();
            known.shuffle(&mut rng);
            provided.shuffle(&mut rng);
        }

        let mut seen = HashSet::new();
        known
            .into_iter()
            .chain(provided)
            .filter(|address| seen.insert(address.clone()))
            .collect()
    }

    /// Opens, authenticates and registers one connection.
    #[instrument(
        name = "connection_manager.connect",
        skip(self, index, address),
        fields(address = %address)
    )]
    async fn connect(self: &Arc<Self>, index: usize, address: Address) -> Result<Arc<Connection>> {
        self.ensure_active()?;
        if !self.pending_connects.lock().insert(address.clone()) {
            return Err(HazelcastError::Connection(format!(
                "connection attempt to {} already in progress",
                address
            )));
        }
        let _pending = PendingConnect {
            pending: &self.pending_connects,
            address: address.clone(),
        };
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);

        let result = self.open_and_authenticate(index, &address).await;
        if let Err(e) = &result {
            let _ = self.event_sender.send(ConnectionEvent::AttemptFailed {
                address,
                error: e.to_string(),
            });
        }
        result
    }

    async fn open_and_authenticate(
        self: &Arc<Self>,
        index: usize,
        address: &Address,
    ) -> Result<Arc<Connection>> {
        let candidate = &self.candidates[index];
        let connect_timeout = candidate.config().network().connection_timeout();

        let stream = tokio::time::timeout(connect_timeout, open_stream(address))
            .await
            .map_err(|_| {
                HazelcastError::Connection(format!(
                    "connection to {} timed out after {:?}",
                    address, connect_timeout
                ))
            })??;
        stream.set_nodelay(true)?;

        let connection = Connection::start(
            stream,
            address.clone(),
            self.dispatcher.clone(),
            self.closed_tx.clone(),
        )?;

        let response = match self.authenticate(candidate, &connection, connect_timeout).await {
            Ok(response) => response,
            Err(e) => {
                connection.close(format!("authentication failed: {}", e));
                return Err(e);
            }
        };
        self.on_authenticated(&connection, response)
    }

    async fn authenticate(
        &self,
        candidate: &CandidateCluster,
        connection: &Arc<Connection>,
        timeout: Duration,
    ) -> Result<AuthenticationResponse> {
        let config = candidate.config();
        let (request, custom) = self.authentication_request(candidate);
        let response = connection.invoke_with_timeout(request, timeout).await?;
        let response = if custom {
            ClientAuthenticationCustom::decode_response(&response)?
        } else {
            ClientAuthentication::decode_response(&response)?
        };

        let address = connection.address();
        match response.status {
            AUTHENTICATED => {}
            CREDENTIALS_FAILED => {
                return Err(HazelcastError::Authentication(format!(
                    "invalid credentials for cluster '{}' at {}",
                    config.cluster_name(),
                    address
                )))
            }
            SERIALIZATION_VERSION_MISMATCH => {
                return Err(HazelcastError::Authentication(format!(
                    "member at {} uses serialization version {}, client uses {}",
                    address, response.serialization_version, SERIALIZATION_VERSION
                )))
            }
            NOT_ALLOWED_IN_CLUSTER => {
                return Err(HazelcastError::Authentication(format!(
                    "client is not allowed in the cluster at {}",
                    address
                )))
            }
            status => {
                return Err(HazelcastError::Authentication(format!(
                    "member at {} rejected authentication with status {}",
                    address, status
                )))
            }
        }

        if !config.skip_cluster_name_check() {
            if let Some(name) = response.key_value_pairs.get(CLUSTER_NAME_ATTRIBUTE) {
                if name != config.cluster_name() {
                    return Err(HazelcastError::Authentication(format!(
                        "member at {} belongs to cluster '{}', expected '{}'",
                        address,
                        name,
                        config.cluster_name()
                    )));
                }
            }
        }
        if self.failover && !response.failover_supported {
            return Err(HazelcastError::Authentication(format!(
                "member at {} does not support failover",
                address
            )));
        }
        Ok(response)
    }

    fn authentication_request(&self, candidate: &CandidateCluster) -> (ClientMessage, bool) {
        let config = candidate.config();
        let routing_mode = Some(config.network().routing_mode().as_byte());
        let cp_direct_to_leader_routing = Some(config.cp_direct_to_leader_routing());

        match candidate.credentials() {
            Some(Credentials::Token(credentials)) | Some(Credentials::Custom(credentials)) => {
                let request = AuthenticationCustomRequest {
                    uuid: self.client_uuid,
                    serialization_version: SERIALIZATION_VERSION,
                    routing_mode,
                    cp_direct_to_leader_routing,
                    cluster_name: config.cluster_name().to_string(),
                    credentials: credentials.clone(),
                    client_type: CLIENT_TYPE.to_string(),
                    client_hazelcast_version: CLIENT_VERSION.to_string(),
                    client_name: self.client_name.clone(),
                    labels: config.labels().to_vec(),
                };
                (ClientAuthenticationCustom::encode_request(&request), true)
            }
            credentials => {
                let (username, password) = match credentials {
                    Some(Credentials::UsernamePassword { username, password }) => {
                        (Some(username.clone()), Some(password.clone()))
                    }
                    _ => (None, None),
                };
                let request = AuthenticationRequest {
                    uuid: self.client_uuid,
                    serialization_version: SERIALIZATION_VERSION,
                    routing_mode,
                    cp_direct_to_leader_routing,
                    cluster_name: config.cluster_name().to_string(),
                    username,
                    password,
                    client_type: CLIENT_TYPE.to_string(),
                    client_hazelcast_version: CLIENT_VERSION.to_string(),
                    client_name: self.client_name.clone(),
                    labels: config.labels().to_vec(),
                };
                (ClientAuthentication::encode_request(&request), false)
            }
        }
    }

    fn on_authenticated(
        &self,
        connection: &Arc<Connection>,
        response: AuthenticationResponse,
    ) -> Result<Arc<Connection>> {
        let Some(member_uuid) = response.member_uuid else {
            connection.close("authentication response without member uuid");
            return Err(HazelcastError::Protocol(
                "authentication response without member uuid".to_string(),
            ));
        };
        connection.set_member_uuid(member_uuid);

        if !self.is_active() {
            connection.close_for_shutdown();
            return Err(not_active());
        }

        let (first, changed_cluster) = {
            let mut connections = self.connections.write();
            let mut cluster_id = self.cluster_id.lock();

            // Shutdown drains the map under this lock; a connection inserted
            // after its drain would never be closed.
            if !self.is_active() {
                drop(cluster_id);
                drop(connections);
                connection.close_for_shutdown();
                return Err(not_active());
            }

            if !connections.is_empty() && *cluster_id != Some(response.cluster_id) {
                drop(cluster_id);
                drop(connections);
                connection.close("member belongs to a different cluster");
                return Err(HazelcastError::Connection(format!(
                    "member {} at {} belongs to cluster {}, not the connected cluster",
                    member_uuid,
                    connection.address(),
                    response.cluster_id
                )));
            }

            let existing = connections
                .get(&member_uuid)
                .filter(|current| current.is_alive())
                .cloned();
            if let Some(existing) = existing {
                drop(cluster_id);
                drop(connections);
                tracing::debug!(member = %member_uuid, "closing duplicate connection");
                connection.close("duplicate connection to member");
                return Ok(existing);
            }

            if !connection.mark_live() {
                return Err(HazelcastError::ConnectionLost(format!(
                    "{} closed during authentication",
                    connection
                )));
            }

            let first = connections.is_empty();
            let changed = first && cluster_id.is_some_and(|id| id != response.cluster_id);
            if first {
                *cluster_id = Some(response.cluster_id);
            }
            connections.insert(member_uuid, Arc::clone(connection));
            (first, changed)
        };

        if !self.is_active() {
            // Shutdown began after the insert; its drain closes the connection.
            return Err(not_active());
        }

        tracing::info!(
            connection = %connection.id(),
            address = %connection.address(),
            member = %member_uuid,
            server_version = %response.server_hazelcast_version,
            "authenticated with member"
        );

        if first {
            if changed_cluster {
                self.cluster.reset();
                self.partitions.reset();
            }
            self.partitions.set_partition_count(response.partition_count);
            self.cluster
                .apply_member_list(response.member_list_version, &response.members);
            self.partitions
                .apply_partition_table(response.partition_list_version, &response.partitions);
        }

        let _ = self.event_sender.send(ConnectionEvent::Connected {
            id: connection.id(),
            address: connection.address().clone(),
            member_uuid,
        });
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.connection_added(connection);
        }

        if first {
            self.connected.send_replace(true);
            self.lifecycle.fire(LifecycleEvent::ClientConnected);
            if changed_cluster {
                self.lifecycle.fire(LifecycleEvent::ClientChangedCluster);
            }
        }
        Ok(Arc::clone(connection))
    }

    fn on_connection_closed(self: &Arc<Self>, connection: &Arc<Connection>) {
        let now_empty = {
            let mut connections = self.connections.write();
            let Some(member_uuid) = connection.member_uuid() else {
                return;
            };
            match connections.get(&member_uuid) {
                Some(current) if Arc::ptr_eq(current, connection) => {
                    connections.remove(&member_uuid);
                    connections.is_empty()
                }
                _ => return,
            }
        };

        tracing::info!(
            connection = %connection.id(),
            address = %connection.address(),
            reason = connection.close_reason().as_deref().unwrap_or("unknown"),
            "removed connection"
        );
        self.fire_connection_removed(connection);

        if now_empty && self.is_active() {
            self.connected.send_replace(false);
            self.lifecycle.fire(LifecycleEvent::ClientDisconnected);
            match self.reconnect_mode() {
                ReconnectMode::Off => {
                    tracing::info!("reconnect mode is off, shutting down");
                    self.spawn_shutdown();
                }
                ReconnectMode::On | ReconnectMode::Async => self.spawn_reconnect(),
            }
        }
    }

    fn fire_connection_removed(&self, connection: &Arc<Connection>) {
        let _ = self.event_sender.send(ConnectionEvent::Disconnected {
            id: connection.id(),
            address: connection.address().clone(),
            reason: connection.close_reason(),
        });
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.connection_removed(connection);
        }
    }

    fn check_heartbeats(&self) {
        let network = self.config().network();
        let interval = network.heartbeat_interval();
        let timeout = network.heartbeat_timeout();
        let now = Instant::now();

        for connection in self.connections() {
            if !connection.is_alive() {
                continue;
            }
            if now.duration_since(connection.last_read_at()) > timeout {
                tracing::warn!(
                    connection = %connection.id(),
                    address = %connection.address(),
                    timeout = ?timeout,
                    "heartbeat timed out"
                );
                connection.close("heartbeat timed out");
            } else if now.duration_since(connection.last_write_at()) >= interval {
                tokio::spawn(async move {
                    let ping = ClientPing::encode_request(&());
                    if let Err(e) = connection.invoke_with_timeout(ping, timeout).await {
                        tracing::debug!(connection = %connection.id(), error = %e, "ping failed");
                    }
                });
            }
        }
    }

    fn maintain_topology(self: &Arc<Self>) {
        if !self.is_active() || !self.is_connected() {
            return;
        }
        let members = self.cluster.members();
        if members.is_empty() {
            return;
        }

        let member_ids: HashSet<Uuid> = members.iter().map(Member::uuid).collect();
        for connection in self.connections() {
            if let Some(uuid) = connection.member_uuid() {
                if !member_ids.contains(&uuid) {
                    connection.close("member left the cluster");
                }
            }
        }

        let network = self.config().network();
        let targets: Vec<&Member> = match network.routing_mode() {
            RoutingMode::SingleMember => return,
            RoutingMode::AllMembers => members.iter().collect(),
            RoutingMode::MultiMember => select_targets(
                &members,
                network.multi_member_count(),
                network.multi_member_strategy(),
            ),
        };

        let index = self.current_candidate.load(Ordering::Acquire);
        for member in &targets {
            if self.connection_for_member(&member.uuid()).is_some()
                || self.pending_connects.lock().contains(member.address())
            {
                continue;
            }
            let manager = Arc::clone(self);
            let address = member.address().clone();
            self.spawn_tracked(async move {
                if let Err(e) = manager.connect(index, address.clone()).await {
                    tracing::debug!(address = %address, error = %e, "failed to connect to member");
                }
            });
        }

        if network.routing_mode() == RoutingMode::MultiMember {
            let target_ids: HashSet<Uuid> = targets.iter().map(|member| member.uuid()).collect();
            let target_live = target_ids
                .iter()
                .any(|uuid| self.connection_for_member(uuid).is_some());
            if target_live {
                for connection in self.connections() {
                    if connection
                        .member_uuid()
                        .is_some_and(|uuid| !target_ids.contains(&uuid))
                    {
                        connection.close("member is not a routing target");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("client_name", &self.client_name)
            .field("cluster", &self.current_cluster_name())
            .field("connections", &self.connection_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Picks the members a multi-member client keeps connections to.
pub(crate) fn select_targets<'a>(
    members: &'a [Member],
    count: usize,
    strategy: &MultiMemberStrategy,
) -> Vec<&'a Member> {
    match strategy {
        MultiMemberStrategy::MemberListOrder => members.iter().take(count).collect(),
        MultiMemberStrategy::PreferAttribute { key, value } => {
            let (preferred, rest): (Vec<&Member>, Vec<&Member>) = members
                .iter()
                .partition(|member| member.attribute(key) == Some(value.as_str()));
            preferred.into_iter().chain(rest).take(count).collect()
        }
    }
}

async fn open_stream(address: &Address) -> Result<TcpStream> {
    let mut last_error = None;
    for socket_address in address.resolve().await? {
        match TcpStream::connect(socket_address).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(HazelcastError::Connection(match last_error {
        Some(e) => format!("failed to connect to {}: {}", address, e),
        None => format!("{} did not resolve to any address", address),
    }))
}

async fn run_closed_handler(
    manager: Weak<ConnectionManager>,
    mut closed: mpsc::UnboundedReceiver<Arc<Connection>>,
) {
    while let Some(connection) = closed.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.on_connection_closed(&connection);
    }
}

async fn run_heartbeat(manager: Weak<ConnectionManager>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.check_heartbeats();
    }
}

async fn run_topology(
    manager: Weak<ConnectionManager>,
    mut membership: broadcast::Receiver<crate::cluster::MemberEvent>,
) {
    let mut ticker = interval(TOPOLOGY_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            event = membership.recv() => match event {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.maintain_topology();
    }
}

fn not_active() -> HazelcastError {
    HazelcastError::ClientNotActive("client closed".to_string())
}

fn next_client_name() -> String {
    static CLIENT_COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("hz.client_{}", CLIENT_COUNTER.fetch_add(1, Ordering::Relaxed))
}

//! In-process mock cluster that speaks the client protocol.
//!
//! Each member listens on its own loopback port, answers authentication,
//! cluster view, ping and topic requests with the real codecs, and can be
//! killed and revived on the same port to exercise reconnection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use bytes::BytesMut;
use hazelcast_client::{ClientConfigBuilder, RoutingMode};
use hazelcast_core::protocol::codecs::client::{
    AuthenticationResponse, ClientAddClusterViewListener, ClientAuthentication,
    ClientAuthenticationCustom, ClientPing, MemberInfo, MemberVersion, MembersViewEvent,
    MembersViewPayload, PartitionsViewEvent, PartitionsViewPayload, WireAddress, AUTHENTICATED,
};
use hazelcast_core::protocol::codecs::error::encode_error;
use hazelcast_core::protocol::codecs::topic::{
    TopicAddMessageListener, TopicMessageEvent, TopicMessagePayload, TopicPublish,
    TopicRemoveMessageListener,
};
use hazelcast_core::protocol::codecs::{BoolResponse, RegistrationIdResponse};
use hazelcast_core::protocol::{
    ClientMessageCodec, Data, Event, Operation, CLIENT_PROTOCOL_HEADER, PARTITION_ID_ANY,
};
use hazelcast_core::ClientMessage;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

/// Topic whose requests are never answered.
pub const SILENT_TOPIC: &str = "silent";

/// Partition count every mock cluster reports.
pub const PARTITION_COUNT: i32 = 7;

const UNKNOWN_OPERATION: i32 = 5;

/// Installs a test-writer subscriber filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` every 20ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Client configuration pointing at every member of `cluster`, with short
/// backoffs suitable for tests.
pub fn client_config(cluster: &MockCluster, routing_mode: RoutingMode) -> ClientConfigBuilder {
    let addresses = cluster.addresses();
    ClientConfigBuilder::new()
        .cluster_name(cluster.name())
        .network(move |n| {
            n.addresses(addresses)
                .routing_mode(routing_mode)
                .shuffle_addresses(false)
                .connection_timeout(Duration::from_secs(1))
                .heartbeat_interval(Duration::from_millis(500))
                .heartbeat_timeout(Duration::from_secs(5))
        })
        .retry(|r| {
            r.initial_backoff(Duration::from_millis(20))
                .max_backoff(Duration::from_millis(200))
                .jitter(0.0)
                .cluster_connect_timeout(Duration::from_secs(5))
        })
        .invocation_timeout(Duration::from_secs(5))
        .invocation_retry_pause(Duration::from_millis(50))
}

/// A cluster of mock members sharing one name, id and member list.
#[derive(Clone)]
pub struct MockCluster {
    shared: Arc<ClusterShared>,
}

struct ClusterShared {
    name: String,
    cluster_id: Uuid,
    auth_status: AtomicU8,
    failover_supported: AtomicBool,
    required_credentials: Mutex<Option<(String, String)>>,
    member_list_version: AtomicI32,
    auth_count: AtomicUsize,
    auth_clients: Mutex<Vec<String>>,
    members: Mutex<Vec<Arc<MockMember>>>,
}

struct MockMember {
    uuid: Uuid,
    address: SocketAddr,
    cluster: Weak<ClusterShared>,
    alive: AtomicBool,
    listeners_silent: AtomicBool,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
    next_session: AtomicU64,
    requests: Mutex<HashMap<i32, usize>>,
}

struct Session {
    id: u64,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    view_correlation: Mutex<Option<i64>>,
}

struct Subscription {
    topic: String,
    correlation_id: i64,
    local_only: bool,
    session: Arc<Session>,
}

impl Session {
    fn send(&self, message: ClientMessage) {
        let _ = self.outbound.send(message);
    }

    fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl MockCluster {
    /// Starts `member_count` members of a cluster called `name`.
    pub async fn start(name: &str, member_count: usize) -> Self {
        let shared = Arc::new(ClusterShared {
            name: name.to_string(),
            cluster_id: Uuid::new_v4(),
            auth_status: AtomicU8::new(AUTHENTICATED),
            failover_supported: AtomicBool::new(true),
            required_credentials: Mutex::new(None),
            member_list_version: AtomicI32::new(1),
            auth_count: AtomicUsize::new(0),
            auth_clients: Mutex::new(Vec::new()),
            members: Mutex::new(Vec::new()),
        });

        for _ in 0..member_count {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let member = Arc::new(MockMember {
                uuid: Uuid::new_v4(),
                address: listener.local_addr().unwrap(),
                cluster: Arc::downgrade(&shared),
                alive: AtomicBool::new(true),
                listeners_silent: AtomicBool::new(false),
                accept_task: Mutex::new(None),
                sessions: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                next_session: AtomicU64::new(1),
                requests: Mutex::new(HashMap::new()),
            });
            member.listen(listener);
            shared.members.lock().push(member);
        }

        Self { shared }
    }

    /// Cluster name reported in the `cluster.name` attribute.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Cluster id reported in authentication responses.
    pub fn cluster_id(&self) -> Uuid {
        self.shared.cluster_id
    }

    /// `host:port` of member `index`.
    pub fn address(&self, index: usize) -> String {
        self.member(index).address.to_string()
    }

    /// Addresses of every member, in start order.
    pub fn addresses(&self) -> Vec<String> {
        self.shared
            .members
            .lock()
            .iter()
            .map(|m| m.address.to_string())
            .collect()
    }

    /// UUID of member `index`.
    pub fn member_uuid(&self, index: usize) -> Uuid {
        self.member(index).uuid
    }

    /// Makes every following authentication answer with `status`.
    pub fn set_auth_status(&self, status: u8) {
        self.shared.auth_status.store(status, Ordering::SeqCst);
    }

    /// Sets the `failover_supported` flag of authentication responses.
    pub fn set_failover_supported(&self, supported: bool) {
        self.shared
            .failover_supported
            .store(supported, Ordering::SeqCst);
    }

    /// Rejects username/password authentication unless the pair matches.
    pub fn require_credentials(&self, username: &str, password: &str) {
        *self.shared.required_credentials.lock() =
            Some((username.to_string(), password.to_string()));
    }

    /// Makes member `index` leave listener registrations unanswered.
    pub fn silence_listener_requests(&self, index: usize, silent: bool) {
        self.member(index)
            .listeners_silent
            .store(silent, Ordering::SeqCst);
    }

    /// Number of authentication requests received by all members.
    pub fn auth_count(&self) -> usize {
        self.shared.auth_count.load(Ordering::SeqCst)
    }

    /// Client names seen in authentication requests.
    pub fn authenticated_clients(&self) -> Vec<String> {
        self.shared.auth_clients.lock().clone()
    }

    /// Number of open client connections on member `index`.
    pub fn connection_count(&self, index: usize) -> usize {
        self.member(index).sessions.lock().len()
    }

    /// Open client connections across the cluster.
    pub fn total_connections(&self) -> usize {
        let members: Vec<_> = self.shared.members.lock().clone();
        members.iter().map(|m| m.sessions.lock().len()).sum()
    }

    /// Active topic subscriptions on member `index`.
    pub fn subscription_count(&self, index: usize, topic: &str) -> usize {
        self.member(index)
            .subscriptions
            .lock()
            .values()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Requests of `message_type` received by member `index`.
    pub fn request_count(&self, index: usize, message_type: i32) -> usize {
        self.member(index)
            .requests
            .lock()
            .get(&message_type)
            .copied()
            .unwrap_or(0)
    }

    /// Publishes `item` on `topic` as if a member-side producer sent it
    /// through member `index`.
    pub fn publish(&self, index: usize, topic: &str, item: &'static str) {
        let member = self.member(index);
        self.shared.deliver(&member, topic, Data::from(item));
    }

    /// Stops member `index`: closes its listener and every client
    /// connection, drops its subscriptions and announces the new member
    /// list to the survivors.
    pub async fn kill(&self, index: usize) {
        let member = self.member(index);
        member.alive.store(false, Ordering::SeqCst);
        if let Some(task) = member.accept_task.lock().take() {
            task.abort();
        }
        member.close_sessions();
        member.subscriptions.lock().clear();
        // Let the aborted accept task release the port.
        tokio::task::yield_now().await;
        self.shared.announce_member_list();
    }

    /// Stops every member.
    pub async fn kill_all(&self) {
        let count = self.shared.members.lock().len();
        for index in 0..count {
            self.kill(index).await;
        }
    }

    /// Restarts member `index` on its original port with the same UUID.
    pub async fn revive(&self, index: usize) {
        let member = self.member(index);
        let mut attempts = 0;
        let listener = loop {
            match TcpListener::bind(member.address).await {
                Ok(listener) => break listener,
                Err(e) if attempts < 50 => {
                    attempts += 1;
                    tracing::debug!(error = %e, "port not yet free");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                Err(e) => panic!("cannot rebind {}: {}", member.address, e),
            }
        };
        member.alive.store(true, Ordering::SeqCst);
        member.listen(listener);
        self.shared.announce_member_list();
    }

    /// Closes every client connection of member `index` but keeps
    /// accepting new ones.
    pub fn drop_connections(&self, index: usize) {
        let member = self.member(index);
        member.close_sessions();
        member.subscriptions.lock().clear();
    }

    /// Stops every member for good.
    pub async fn shutdown(&self) {
        self.kill_all().await;
    }

    fn member(&self, index: usize) -> Arc<MockMember> {
        Arc::clone(&self.shared.members.lock()[index])
    }
}

impl ClusterShared {
    fn alive_members(&self) -> Vec<Arc<MockMember>> {
        self.members
            .lock()
            .iter()
            .filter(|m| m.alive.load(Ordering::SeqCst))
            .cloned()
            .collect()
    }

    fn member_infos(&self) -> Vec<MemberInfo> {
        self.alive_members()
            .iter()
            .map(|m| MemberInfo {
                uuid: m.uuid,
                lite_member: false,
                address: WireAddress::new("127.0.0.1", i32::from(m.address.port())),
                attributes: HashMap::new(),
                version: MemberVersion {
                    major: 5,
                    minor: 4,
                    patch: 0,
                },
            })
            .collect()
    }

    fn partition_table(&self) -> Vec<(Uuid, Vec<i32>)> {
        let alive = self.alive_members();
        if alive.is_empty() {
            return Vec::new();
        }
        let mut table: Vec<(Uuid, Vec<i32>)> = alive.iter().map(|m| (m.uuid, Vec::new())).collect();
        for partition in 0..PARTITION_COUNT {
            let slot = partition as usize % table.len();
            table[slot].1.push(partition);
        }
        table
    }

    fn members_view(&self) -> MembersViewPayload {
        MembersViewPayload {
            version: self.member_list_version.load(Ordering::SeqCst),
            members: self.member_infos(),
        }
    }

    fn partitions_view(&self) -> PartitionsViewPayload {
        PartitionsViewPayload {
            version: self.member_list_version.load(Ordering::SeqCst),
            partitions: self.partition_table(),
        }
    }

    fn announce_member_list(&self) {
        self.member_list_version.fetch_add(1, Ordering::SeqCst);
        let members = self.members_view();
        let partitions = self.partitions_view();
        for member in self.alive_members() {
            let sessions: Vec<_> = member.sessions.lock().values().cloned().collect();
            for session in sessions {
                let Some(correlation_id) = *session.view_correlation.lock() else {
                    continue;
                };
                let mut event = MembersViewEvent::encode_event(&members, PARTITION_ID_ANY);
                event.set_correlation_id(correlation_id);
                session.send(event);
                let mut event = PartitionsViewEvent::encode_event(&partitions, PARTITION_ID_ANY);
                event.set_correlation_id(correlation_id);
                session.send(event);
            }
        }
    }

    fn deliver(&self, publisher: &MockMember, topic: &str, item: Data) {
        let payload = TopicMessagePayload {
            publish_time: 0,
            publishing_member: Some(publisher.uuid),
            item,
        };
        for member in self.alive_members() {
            let local = member.uuid == publisher.uuid;
            let subscriptions = member.subscriptions.lock();
            for subscription in subscriptions.values() {
                if subscription.topic != topic || (subscription.local_only && !local) {
                    continue;
                }
                let mut event = TopicMessageEvent::encode_event(&payload, PARTITION_ID_ANY);
                event.set_correlation_id(subscription.correlation_id);
                subscription.session.send(event);
            }
        }
    }

    fn authentication_response(&self, member: &MockMember, status: u8) -> AuthenticationResponse {
        let mut key_value_pairs = HashMap::new();
        key_value_pairs.insert("cluster.name".to_string(), self.name.clone());
        AuthenticationResponse {
            status,
            member_uuid: Some(member.uuid),
            serialization_version: 1,
            partition_count: PARTITION_COUNT,
            cluster_id: self.cluster_id,
            failover_supported: self.failover_supported.load(Ordering::SeqCst),
            member_list_version: self.member_list_version.load(Ordering::SeqCst),
            partition_list_version: self.member_list_version.load(Ordering::SeqCst),
            address: Some(WireAddress::new(
                "127.0.0.1",
                i32::from(member.address.port()),
            )),
            server_hazelcast_version: "5.4.0".to_string(),
            members: self.member_infos(),
            partitions: self.partition_table(),
            key_value_pairs,
        }
    }
}

impl MockMember {
    fn listen(self: &Arc<Self>, listener: TcpListener) {
        let member = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                member.serve(stream);
            }
        });
        *self.accept_task.lock() = Some(task);
    }

    fn close_sessions(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }
    }

    fn remove_session(&self, id: u64) {
        self.sessions.lock().remove(&id);
        self.subscriptions
            .lock()
            .retain(|_, subscription| subscription.session.id != id);
    }

    fn serve(self: &Arc<Self>, stream: TcpStream) {
        let _ = stream.set_nodelay(true);
        let (mut reader, mut writer) = stream.into_split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let session = Arc::new(Session {
            id: self.next_session.fetch_add(1, Ordering::SeqCst),
            outbound,
            tasks: Mutex::new(Vec::new()),
            view_correlation: Mutex::new(None),
        });

        let writer_task = tokio::spawn(async move {
            let mut codec = ClientMessageCodec::new();
            while let Some(message) = outbound_rx.recv().await {
                let mut buffer = BytesMut::new();
                if codec.encode(message, &mut buffer).is_err() {
                    continue;
                }
                if writer.write_all(&buffer).await.is_err() {
                    return;
                }
            }
        });

        let member = Arc::clone(self);
        let reader_session = Arc::clone(&session);
        let reader_task = tokio::spawn(async move {
            let mut header = [0u8; 3];
            let header_ok = reader.read_exact(&mut header).await.is_ok()
                && &header == CLIENT_PROTOCOL_HEADER;
            if header_ok {
                let mut codec = ClientMessageCodec::new();
                let mut buffer = BytesMut::with_capacity(8192);
                'read: loop {
                    loop {
                        match codec.decode(&mut buffer) {
                            Ok(Some(request)) => member.handle(&reader_session, request),
                            Ok(None) => break,
                            Err(_) => break 'read,
                        }
                    }
                    match reader.read_buf(&mut buffer).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            }
            member.remove_session(reader_session.id);
            reader_session.close();
        });

        session.tasks.lock().extend([writer_task, reader_task]);
        self.sessions.lock().insert(session.id, session);
    }

    fn handle(self: &Arc<Self>, session: &Arc<Session>, request: ClientMessage) {
        let Some(message_type) = request.message_type() else {
            return;
        };
        *self.requests.lock().entry(message_type).or_insert(0) += 1;
        let correlation_id = request.correlation_id().unwrap_or(0);

        let replies = match handlers().get(&message_type) {
            Some(handler) => handler(self, session, &request),
            None => vec![encode_error(
                UNKNOWN_OPERATION,
                "java.lang.UnsupportedOperationException",
                Some("unknown message type"),
            )],
        };
        for mut reply in replies {
            reply.set_correlation_id(correlation_id);
            session.send(reply);
        }
    }

    fn cluster(&self) -> Arc<ClusterShared> {
        self.cluster.upgrade().expect("cluster dropped")
    }
}

type Handler = fn(&Arc<MockMember>, &Arc<Session>, &ClientMessage) -> Vec<ClientMessage>;

fn handlers() -> &'static HashMap<i32, Handler> {
    static HANDLERS: OnceLock<HashMap<i32, Handler>> = OnceLock::new();
    HANDLERS.get_or_init(|| {
        let mut table: HashMap<i32, Handler> = HashMap::new();
        table.insert(ClientAuthentication::REQUEST_MESSAGE_TYPE, authenticate);
        table.insert(ClientAuthenticationCustom::REQUEST_MESSAGE_TYPE, authenticate_custom);
        table.insert(ClientAddClusterViewListener::REQUEST_MESSAGE_TYPE, add_cluster_view_listener);
        table.insert(ClientPing::REQUEST_MESSAGE_TYPE, ping);
        table.insert(TopicAddMessageListener::REQUEST_MESSAGE_TYPE, add_topic_listener);
        table.insert(TopicRemoveMessageListener::REQUEST_MESSAGE_TYPE, remove_topic_listener);
        table.insert(TopicPublish::REQUEST_MESSAGE_TYPE, publish);
        table
    })
}

fn malformed(error: impl std::fmt::Display) -> Vec<ClientMessage> {
    vec![encode_error(
        UNKNOWN_OPERATION,
        "com.hazelcast.client.impl.protocol.ClientProtocolErrorCodes",
        Some(&error.to_string()),
    )]
}

fn authenticate(member: &Arc<MockMember>, _: &Arc<Session>, request: &ClientMessage) -> Vec<ClientMessage> {
    let request = match ClientAuthentication::decode_request(request) {
        Ok(request) => request,
        Err(e) => return malformed(e),
    };
    let cluster = member.cluster();
    cluster.auth_count.fetch_add(1, Ordering::SeqCst);
    cluster.auth_clients.lock().push(request.client_name.clone());

    let mut status = cluster.auth_status.load(Ordering::SeqCst);
    if let Some((username, password)) = cluster.required_credentials.lock().clone() {
        if request.username.as_deref() != Some(username.as_str())
            || request.password.as_deref() != Some(password.as_str())
        {
            status = hazelcast_core::protocol::codecs::client::CREDENTIALS_FAILED;
        }
    }
    vec![ClientAuthentication::encode_response(
        &cluster.authentication_response(member, status),
    )]
}

fn authenticate_custom(
    member: &Arc<MockMember>,
    _: &Arc<Session>,
    request: &ClientMessage,
) -> Vec<ClientMessage> {
    let request = match ClientAuthenticationCustom::decode_request(request) {
        Ok(request) => request,
        Err(e) => return malformed(e),
    };
    let cluster = member.cluster();
    cluster.auth_count.fetch_add(1, Ordering::SeqCst);
    cluster.auth_clients.lock().push(request.client_name.clone());
    let status = cluster.auth_status.load(Ordering::SeqCst);
    vec![ClientAuthenticationCustom::encode_response(
        &cluster.authentication_response(member, status),
    )]
}

fn add_cluster_view_listener(
    member: &Arc<MockMember>,
    session: &Arc<Session>,
    request: &ClientMessage,
) -> Vec<ClientMessage> {
    *session.view_correlation.lock() = request.correlation_id();
    let cluster = member.cluster();
    vec![
        ClientAddClusterViewListener::encode_response(&()),
        MembersViewEvent::encode_event(&cluster.members_view(), PARTITION_ID_ANY),
        PartitionsViewEvent::encode_event(&cluster.partitions_view(), PARTITION_ID_ANY),
    ]
}

fn ping(_: &Arc<MockMember>, _: &Arc<Session>, _: &ClientMessage) -> Vec<ClientMessage> {
    vec![ClientPing::encode_response(&())]
}

fn add_topic_listener(
    member: &Arc<MockMember>,
    session: &Arc<Session>,
    request: &ClientMessage,
) -> Vec<ClientMessage> {
    let correlation_id = request.correlation_id().unwrap_or(0);
    let request = match TopicAddMessageListener::decode_request(request) {
        Ok(request) => request,
        Err(e) => return malformed(e),
    };
    if request.name == SILENT_TOPIC || member.listeners_silent.load(Ordering::SeqCst) {
        return Vec::new();
    }
    let registration_id = Uuid::new_v4();
    member.subscriptions.lock().insert(
        registration_id,
        Subscription {
            topic: request.name,
            correlation_id,
            local_only: request.local_only,
            session: Arc::clone(session),
        },
    );
    vec![TopicAddMessageListener::encode_response(
        &RegistrationIdResponse {
            response: registration_id,
        },
    )]
}

fn remove_topic_listener(
    member: &Arc<MockMember>,
    _: &Arc<Session>,
    request: &ClientMessage,
) -> Vec<ClientMessage> {
    let request = match TopicRemoveMessageListener::decode_request(request) {
        Ok(request) => request,
        Err(e) => return malformed(e),
    };
    let removed = member
        .subscriptions
        .lock()
        .remove(&request.registration_id)
        .is_some();
    vec![TopicRemoveMessageListener::encode_response(&BoolResponse {
        response: removed,
    })]
}

fn publish(member: &Arc<MockMember>, _: &Arc<Session>, request: &ClientMessage) -> Vec<ClientMessage> {
    let request = match TopicPublish::decode_request(request) {
        Ok(request) => request,
        Err(e) => return malformed(e),
    };
    if request.name == SILENT_TOPIC {
        return Vec::new();
    }
    member.cluster().deliver(member, &request.name, request.message);
    vec![TopicPublish::encode_response(&())]
}

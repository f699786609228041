//! Single connection to a Hazelcast cluster member.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use bytes::BytesMut;
use hazelcast_core::protocol::codecs::error::{decode_error, is_error_message};
use hazelcast_core::protocol::{
    codec_registry, next_correlation_id, ClientMessage, ClientMessageCodec,
    CLIENT_PROTOCOL_HEADER,
};
use hazelcast_core::{HazelcastError, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

use super::Address;
use crate::listener::{EventDispatcher, EventHandler};

const READ_BUFFER_SIZE: usize = 8192;
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;
/// Messages coalesced into one socket write.
const MAX_WRITE_BATCH: usize = 64;

const STATE_AUTHENTICATING: u8 = 0;
const STATE_LIVE: u8 = 1;
const STATE_CLOSED: u8 = 2;

type ResponseSender = oneshot::Sender<Result<ClientMessage>>;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An authenticated (or authenticating) connection to one member.
///
/// Each connection owns a reader task that decodes inbound frames and a
/// writer task that drains a bounded outbound queue. Responses complete the
/// oneshot registered under their correlation id; events go to the event
/// dispatcher together with the handler registered under the correlation id
/// of the request that created the listener.
///
/// Closing is a single-winner transition: only the first call to
/// [`Connection::close`] drains pending requests and notifies the
/// connection manager.
pub struct Connection {
    id: ConnectionId,
    address: Address,
    remote_address: SocketAddr,
    member_uuid: OnceLock<Uuid>,
    state: AtomicU8,
    created_at: Instant,
    last_read_millis: AtomicU64,
    last_write_millis: AtomicU64,
    outbound: mpsc::Sender<ClientMessage>,
    pending: Mutex<HashMap<i64, ResponseSender>>,
    event_handlers: Mutex<HashMap<i64, Arc<dyn EventHandler>>>,
    dispatcher: EventDispatcher,
    closed_tx: mpsc::UnboundedSender<Arc<Connection>>,
    close_reason: Mutex<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Wraps an established stream and spawns its reader and writer tasks.
    ///
    /// The writer sends the protocol header before anything else.
    pub(crate) fn start(
        stream: TcpStream,
        address: Address,
        dispatcher: EventDispatcher,
        closed_tx: mpsc::UnboundedSender<Arc<Connection>>,
    ) -> Result<Arc<Self>> {
        let remote_address = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            address,
            remote_address,
            member_uuid: OnceLock::new(),
            state: AtomicU8::new(STATE_AUTHENTICATING),
            created_at: Instant::now(),
            last_read_millis: AtomicU64::new(0),
            last_write_millis: AtomicU64::new(0),
            outbound,
            pending: Mutex::new(HashMap::new()),
            event_handlers: Mutex::new(HashMap::new()),
            dispatcher,
            closed_tx,
            close_reason: Mutex::new(None),
            tasks: Mutex::new(Vec::with_capacity(2)),
        });

        let read_task = tokio::spawn(read_loop(Arc::downgrade(&connection), reader));
        let write_task = tokio::spawn(write_loop(
            Arc::downgrade(&connection),
            writer,
            outbound_rx,
        ));

        {
            let mut tasks = connection.tasks.lock();
            tasks.push(read_task);
            tasks.push(write_task);
            // The reader may have failed before its handle was stored.
            if !connection.is_alive() {
                tasks.drain(..).for_each(|task| task.abort());
            }
        }

        tracing::debug!(
            connection = %connection.id,
            address = %connection.address,
            remote = %remote_address,
            "established connection"
        );
        Ok(connection)
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the address this connection was opened to.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the resolved remote socket address.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// Returns the UUID of the member, once authenticated.
    pub fn member_uuid(&self) -> Option<Uuid> {
        self.member_uuid.get().copied()
    }

    pub(crate) fn set_member_uuid(&self, uuid: Uuid) {
        let _ = self.member_uuid.set(uuid);
    }

    /// Returns when this connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns when data was last read from this connection.
    pub fn last_read_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_read_millis.load(Ordering::Relaxed))
    }

    /// Returns when data was last written to this connection.
    pub fn last_write_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_write_millis.load(Ordering::Relaxed))
    }

    fn touch_read(&self) {
        self.last_read_millis
            .store(self.created_at.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn touch_write(&self) {
        self.last_write_millis
            .store(self.created_at.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Returns true until the connection is closed.
    pub fn is_alive(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_CLOSED
    }

    /// Returns true once authenticated and until closed.
    pub fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_LIVE
    }

    /// Moves an authenticated connection to the live state.
    pub(crate) fn mark_live(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_AUTHENTICATING,
                STATE_LIVE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Returns why the connection was closed, if it was.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Queues a message for writing.
    ///
    /// Returns once the message is queued, not when it reaches the socket.
    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        if message.is_empty() {
            return Err(HazelcastError::Protocol(
                "cannot send a message without frames".to_string(),
            ));
        }
        if !self.is_alive() {
            return Err(self.closed_error());
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Sends a request and waits for its response without a deadline.
    pub async fn invoke(&self, message: ClientMessage) -> Result<ClientMessage> {
        self.invoke_inner(message, None, None)
            .await
            .map(|(_, response)| response)
    }

    /// Sends a request and waits at most `timeout` for its response.
    ///
    /// On timeout the wait is cancelled; the connection stays open.
    pub async fn invoke_with_timeout(
        &self,
        message: ClientMessage,
        timeout: Duration,
    ) -> Result<ClientMessage> {
        self.invoke_inner(message, None, Some(timeout))
            .await
            .map(|(_, response)| response)
    }

    /// Sends a listener registration request with `handler` registered for
    /// the events it produces. Returns the correlation id events will carry.
    pub(crate) async fn invoke_with_event_handler(
        &self,
        message: ClientMessage,
        handler: Arc<dyn EventHandler>,
        timeout: Duration,
    ) -> Result<(i64, ClientMessage)> {
        self.invoke_inner(message, Some(handler), Some(timeout)).await
    }

    async fn invoke_inner(
        &self,
        mut message: ClientMessage,
        handler: Option<Arc<dyn EventHandler>>,
        timeout: Option<Duration>,
    ) -> Result<(i64, ClientMessage)> {
        let correlation_id = next_correlation_id();
        message.set_correlation_id(correlation_id);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(correlation_id, tx);
        let mut guard = PendingInvocation {
            connection: self,
            correlation_id,
            has_handler: handler.is_some(),
            completed: false,
        };
        if let Some(handler) = handler {
            self.event_handlers.lock().insert(correlation_id, handler);
        }

        let exchange = self.send_and_wait(message, rx);
        let result = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result,
                Err(_) => Err(HazelcastError::Timeout(format!(
                    "no response from {} for correlation id {} within {:?}",
                    self.address, correlation_id, timeout
                ))),
            },
            None => exchange.await,
        };

        guard.completed = result.is_ok();
        result.map(|response| (correlation_id, response))
    }

    async fn send_and_wait(
        &self,
        message: ClientMessage,
        response: oneshot::Receiver<Result<ClientMessage>>,
    ) -> Result<ClientMessage> {
        // Checked after the waiter is registered so a concurrent close
        // either sees the waiter or this check sees the close.
        if !self.is_alive() {
            return Err(self.closed_error());
        }
        self.send(message).await?;

        let response = response.await.map_err(|_| {
            HazelcastError::ConnectionLost(format!("{} to {} was dropped", self.id, self.address))
        })??;

        if is_error_message(&response) {
            return Err(decode_error(&response));
        }
        Ok(response)
    }

    /// Removes the event handler registered under `correlation_id`.
    pub(crate) fn remove_event_handler(&self, correlation_id: i64) -> bool {
        self.event_handlers.lock().remove(&correlation_id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn event_handler_count(&self) -> usize {
        self.event_handlers.lock().len()
    }

    fn handle_inbound(self: &Arc<Self>, message: ClientMessage) {
        let Some(correlation_id) = message.correlation_id() else {
            return;
        };

        if message.is_event() {
            let handler = self.event_handlers.lock().get(&correlation_id).cloned();
            match handler {
                Some(handler) => self.dispatcher.dispatch(Arc::clone(self), handler, message),
                None => tracing::trace!(
                    connection = %self.id,
                    correlation_id,
                    "dropping event without a registered handler"
                ),
            }
            return;
        }

        let waiter = self.pending.lock().remove(&correlation_id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(Ok(message));
            }
            None => tracing::debug!(
                connection = %self.id,
                correlation_id,
                "response for unknown correlation id"
            ),
        }
    }

    /// Closes the connection. Returns true only for the call that closed it.
    ///
    /// Pending requests fail with [`HazelcastError::ConnectionLost`].
    pub fn close(self: &Arc<Self>, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let lost = format!("{} to {} closed: {}", self.id, self.address, reason);
        self.close_with(reason, move || HazelcastError::ConnectionLost(lost.clone()))
    }

    /// Closes the connection as part of client shutdown.
    ///
    /// Pending requests fail with [`HazelcastError::ClientNotActive`].
    pub(crate) fn close_for_shutdown(self: &Arc<Self>) -> bool {
        self.close_with("client shutdown".to_string(), || {
            HazelcastError::ClientNotActive("client closed".to_string())
        })
    }

    fn close_with(self: &Arc<Self>, reason: String, error: impl Fn() -> HazelcastError) -> bool {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_CLOSED {
            return false;
        }
        *self.close_reason.lock() = Some(reason.clone());

        let pending: Vec<ResponseSender> = self.pending.lock().drain().map(|(_, w)| w).collect();
        for waiter in pending {
            let _ = waiter.send(Err(error()));
        }
        self.event_handlers.lock().clear();
        self.tasks.lock().drain(..).for_each(|task| task.abort());

        tracing::info!(
            connection = %self.id,
            address = %self.address,
            reason = %reason,
            "connection closed"
        );
        let _ = self.closed_tx.send(Arc::clone(self));
        true
    }

    fn closed_error(&self) -> HazelcastError {
        HazelcastError::Connection(format!("{} to {} is closed", self.id, self.address))
    }
}

/// Forgets the waiter and event handler of an invocation that failed or
/// whose caller stopped waiting.
struct PendingInvocation<'a> {
    connection: &'a Connection,
    correlation_id: i64,
    has_handler: bool,
    completed: bool,
}

impl Drop for PendingInvocation<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.connection.pending.lock().remove(&self.correlation_id);
        if self.has_handler {
            self.connection
                .event_handlers
                .lock()
                .remove(&self.correlation_id);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.tasks.lock().drain(..).for_each(|task| task.abort());
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("member_uuid", &self.member_uuid())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.id, self.address)
    }
}

async fn read_loop(connection: Weak<Connection>, mut reader: OwnedReadHalf) {
    let mut codec = ClientMessageCodec::with_registry(codec_registry());
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

    let reason = loop {
        match codec.decode(&mut buffer) {
            Ok(Some(message)) => {
                let Some(connection) = connection.upgrade() else {
                    return;
                };
                connection.touch_read();
                connection.handle_inbound(message);
                continue;
            }
            Ok(None) => {}
            Err(e) => break e.to_string(),
        }

        match reader.read_buf(&mut buffer).await {
            Ok(0) => match codec.decode_eof(&mut buffer) {
                Err(e) => break e.to_string(),
                Ok(_) => break "connection closed by the member".to_string(),
            },
            Ok(_) => {}
            Err(e) => break format!("read failed: {}", e),
        }
    };

    if let Some(connection) = connection.upgrade() {
        connection.close(reason);
    }
}

async fn write_loop(
    connection: Weak<Connection>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<ClientMessage>,
) {
    let mut codec = ClientMessageCodec::new();
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    buffer.extend_from_slice(CLIENT_PROTOCOL_HEADER);

    while let Some(message) = outbound.recv().await {
        let mut batch = vec![message];
        while batch.len() < MAX_WRITE_BATCH {
            match outbound.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }
        for message in batch {
            if let Err(e) = codec.encode(message, &mut buffer) {
                tracing::warn!(error = %e, "dropping message that cannot be encoded");
            }
        }

        if let Err(e) = writer.write_all(&buffer).await {
            if let Some(connection) = connection.upgrade() {
                connection.close(format!("write failed: {}", e));
            }
            return;
        }
        buffer.clear();

        if let Some(connection) = connection.upgrade() {
            connection.touch_write();
        }
    }
}

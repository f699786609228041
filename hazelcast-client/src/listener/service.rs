//! Listener registry: installs registrations on every live connection and
//! replays them on connections that come up later.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use hazelcast_core::{HazelcastError, Result};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use super::codecs::ListenerMessageCodec;
use super::event::EventHandler;
use crate::config::RoutingMode;
use crate::connection::{Connection, ConnectionId, ConnectionListener};

/// Interval at which failed installs are retried.
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

enum Command {
    Register {
        codec: Arc<dyn ListenerMessageCodec>,
        handler: Arc<dyn EventHandler>,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    Deregister {
        id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    Installed {
        id: Uuid,
        reply: oneshot::Sender<Option<Vec<ConnectionId>>>,
    },
    ConnectionAdded(Arc<Connection>),
    ConnectionRemoved(Arc<Connection>),
}

/// Handle to the listener registry actor.
///
/// The registry task only keeps the books. Installs run on one queue per
/// connection, in the order they were submitted for that connection, and
/// their results are applied as they arrive, so a member that stops
/// answering delays only the work queued for its own connection.
#[derive(Debug)]
pub(crate) struct ListenerService {
    commands: mpsc::UnboundedSender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerService {
    /// Spawns the registry task.
    ///
    /// Registrations are local-only unless the client talks to a single member.
    pub(crate) fn start(routing_mode: RoutingMode, invocation_timeout: Duration) -> Arc<Self> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (outcomes, outcome_receiver) = mpsc::unbounded_channel();
        let registry = Registry {
            local_only: routing_mode != RoutingMode::SingleMember,
            invocation_timeout,
            registrations: HashMap::new(),
            live: BTreeMap::new(),
            queued: HashSet::new(),
            failed: HashSet::new(),
            outcomes,
        };
        let task = tokio::spawn(registry.run(receiver, outcome_receiver));
        Arc::new(Self {
            commands,
            task: Mutex::new(Some(task)),
        })
    }

    /// Registers a listener on every live connection and on every later one.
    ///
    /// Completes once every connection live at submission has answered.
    pub(crate) async fn register(
        &self,
        codec: Arc<dyn ListenerMessageCodec>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Uuid> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Register {
            codec,
            handler,
            reply,
        })?;
        response.await.map_err(|_| stopped())?
    }

    /// Removes a registration. Returns false if it did not exist.
    pub(crate) async fn deregister(&self, id: Uuid) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Deregister { id, reply })?;
        response.await.map_err(|_| stopped())
    }

    /// Returns the connections a registration is installed on.
    pub(crate) async fn installed_connections(&self, id: Uuid) -> Result<Option<Vec<ConnectionId>>> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Installed { id, reply })?;
        response.await.map_err(|_| stopped())
    }

    /// Stops the registry task. Pending commands are dropped.
    pub(crate) fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| stopped())
    }
}

impl ConnectionListener for ListenerService {
    fn connection_added(&self, connection: &Arc<Connection>) {
        let _ = self
            .commands
            .send(Command::ConnectionAdded(Arc::clone(connection)));
    }

    fn connection_removed(&self, connection: &Arc<Connection>) {
        let _ = self
            .commands
            .send(Command::ConnectionRemoved(Arc::clone(connection)));
    }
}

fn stopped() -> HazelcastError {
    HazelcastError::ClientNotActive("listener service stopped".to_string())
}

struct Install {
    connection: Arc<Connection>,
    correlation_id: i64,
    server_id: Uuid,
}

/// A caller waiting for the first round of installs.
struct PendingRegister {
    reply: oneshot::Sender<Result<Uuid>>,
    outstanding: HashSet<ConnectionId>,
    error: Option<HazelcastError>,
}

struct Registration {
    codec: Arc<dyn ListenerMessageCodec>,
    handler: Arc<dyn EventHandler>,
    installs: HashMap<ConnectionId, Install>,
    pending: Option<PendingRegister>,
}

struct InstallJob {
    id: Uuid,
    codec: Arc<dyn ListenerMessageCodec>,
    handler: Arc<dyn EventHandler>,
}

struct InstallOutcome {
    id: Uuid,
    codec: Arc<dyn ListenerMessageCodec>,
    connection: Arc<Connection>,
    result: Result<Install>,
}

struct Registry {
    local_only: bool,
    invocation_timeout: Duration,
    registrations: HashMap<Uuid, Registration>,
    /// Install queue of every live connection.
    live: BTreeMap<ConnectionId, mpsc::UnboundedSender<InstallJob>>,
    queued: HashSet<(Uuid, ConnectionId)>,
    failed: HashSet<(Uuid, ConnectionId)>,
    outcomes: mpsc::UnboundedSender<InstallOutcome>,
}

/// A failure caused by the connection going away; replay covers it.
fn is_connection_failure(error: &HazelcastError, connection: &Connection) -> bool {
    !connection.is_alive() || error.is_retryable_before_send() || error.is_connection_lost()
}

async fn install(
    codec: &Arc<dyn ListenerMessageCodec>,
    handler: &Arc<dyn EventHandler>,
    connection: &Arc<Connection>,
    local_only: bool,
    timeout: Duration,
) -> Result<Install> {
    let request = codec.encode_add_request(local_only);
    let (correlation_id, response) = connection
        .invoke_with_event_handler(request, Arc::clone(handler), timeout)
        .await?;

    match codec.decode_add_response(&response) {
        Ok(server_id) => Ok(Install {
            connection: Arc::clone(connection),
            correlation_id,
            server_id,
        }),
        Err(e) => {
            connection.remove_event_handler(correlation_id);
            Err(e)
        }
    }
}

/// Drops the local handler and asks the member to forget the registration.
fn uninstall(codec: &Arc<dyn ListenerMessageCodec>, install: Install, timeout: Duration) {
    install.connection.remove_event_handler(install.correlation_id);
    if !install.connection.is_alive() {
        return;
    }
    let request = codec.encode_remove_request(install.server_id);
    let connection = install.connection;
    tokio::spawn(async move {
        if let Err(e) = connection.invoke_with_timeout(request, timeout).await {
            tracing::debug!(
                connection = %connection.id(),
                error = %e,
                "failed to remove listener registration from member"
            );
        }
    });
}

/// Runs the installs queued for one connection, one at a time.
///
/// Ends once the registry drops the queue and the backlog is drained.
fn spawn_install_queue(
    connection: Arc<Connection>,
    local_only: bool,
    timeout: Duration,
    outcomes: mpsc::UnboundedSender<InstallOutcome>,
) -> mpsc::UnboundedSender<InstallJob> {
    let (queue, mut jobs) = mpsc::unbounded_channel::<InstallJob>();
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let result = install(&job.codec, &job.handler, &connection, local_only, timeout).await;
            let outcome = InstallOutcome {
                id: job.id,
                codec: job.codec,
                connection: Arc::clone(&connection),
                result,
            };
            if outcomes.send(outcome).is_err() {
                break;
            }
        }
    });
    queue
}

impl Registry {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<InstallOutcome>,
    ) {
        let mut retry = interval(RETRY_INTERVAL);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(outcome) = outcomes.recv() => self.install_finished(outcome),
                _ = retry.tick() => self.retry_failed(),
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                codec,
                handler,
                reply,
            } => self.register(codec, handler, reply),
            Command::Deregister { id, reply } => {
                let _ = reply.send(self.deregister(id));
            }
            Command::Installed { id, reply } => {
                let installed = self
                    .registrations
                    .get(&id)
                    .map(|registration| registration.installs.keys().copied().collect());
                let _ = reply.send(installed);
            }
            Command::ConnectionAdded(connection) => self.connection_added(connection),
            Command::ConnectionRemoved(connection) => self.connection_removed(&connection),
        }
    }

    fn register(
        &mut self,
        codec: Arc<dyn ListenerMessageCodec>,
        handler: Arc<dyn EventHandler>,
        reply: oneshot::Sender<Result<Uuid>>,
    ) {
        let id = Uuid::new_v4();
        self.registrations.insert(
            id,
            Registration {
                codec,
                handler,
                installs: HashMap::new(),
                pending: None,
            },
        );

        let connections: Vec<ConnectionId> = self.live.keys().copied().collect();
        let outstanding: HashSet<ConnectionId> = connections
            .into_iter()
            .filter(|connection_id| self.enqueue(id, *connection_id))
            .collect();

        if outstanding.is_empty() {
            tracing::debug!(registration = %id, connections = 0, "listener registered");
            let _ = reply.send(Ok(id));
            return;
        }
        if let Some(registration) = self.registrations.get_mut(&id) {
            registration.pending = Some(PendingRegister {
                reply,
                outstanding,
                error: None,
            });
        }
    }

    /// Queues an install unless the registration is already installed on,
    /// or queued for, the connection. Returns true if a job was queued.
    fn enqueue(&mut self, id: Uuid, connection_id: ConnectionId) -> bool {
        let (Some(registration), Some(queue)) =
            (self.registrations.get(&id), self.live.get(&connection_id))
        else {
            return false;
        };
        if registration.installs.contains_key(&connection_id)
            || self.queued.contains(&(id, connection_id))
        {
            return false;
        }
        let job = InstallJob {
            id,
            codec: Arc::clone(&registration.codec),
            handler: Arc::clone(&registration.handler),
        };
        if queue.send(job).is_err() {
            return false;
        }
        self.queued.insert((id, connection_id));
        true
    }

    fn install_finished(&mut self, outcome: InstallOutcome) {
        let InstallOutcome {
            id,
            codec,
            connection,
            result,
        } = outcome;
        let connection_id = connection.id();
        self.queued.remove(&(id, connection_id));
        let still_live = self.live.contains_key(&connection_id);

        let Some(registration) = self.registrations.get_mut(&id) else {
            // Deregistered or rolled back while the install was in flight.
            if let Ok(installed) = result {
                uninstall(&codec, installed, self.invocation_timeout);
            }
            return;
        };
        let initial = registration
            .pending
            .as_ref()
            .is_some_and(|pending| pending.outstanding.contains(&connection_id));

        match result {
            Ok(installed) if still_live && !registration.installs.contains_key(&connection_id) => {
                registration.installs.insert(connection_id, installed);
                self.failed.remove(&(id, connection_id));
            }
            Ok(installed) => uninstall(&codec, installed, self.invocation_timeout),
            Err(e) if is_connection_failure(&e, &connection) => {
                tracing::debug!(
                    registration = %id,
                    connection = %connection_id,
                    error = %e,
                    "connection lost while installing listener"
                );
            }
            Err(e) if initial => {
                if let Some(pending) = registration.pending.as_mut() {
                    if pending.error.is_none() {
                        pending.error = Some(e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    registration = %id,
                    connection = %connection_id,
                    error = %e,
                    "failed to replay listener registration, will retry"
                );
                self.failed.insert((id, connection_id));
            }
        }

        let settled = match registration.pending.as_mut() {
            Some(pending) => {
                pending.outstanding.remove(&connection_id);
                pending.outstanding.is_empty()
            }
            None => false,
        };
        if settled {
            self.complete_registration(id);
        }
    }

    /// Answers the caller once every initial install has settled. Any
    /// failure other than a lost connection rolls the registration back.
    fn complete_registration(&mut self, id: Uuid) {
        let Some(pending) = self
            .registrations
            .get_mut(&id)
            .and_then(|registration| registration.pending.take())
        else {
            return;
        };

        match pending.error {
            None => {
                let connections = self
                    .registrations
                    .get(&id)
                    .map_or(0, |registration| registration.installs.len());
                tracing::debug!(registration = %id, connections, "listener registered");
                let _ = pending.reply.send(Ok(id));
            }
            Some(e) => {
                if let Some(mut registration) = self.registrations.remove(&id) {
                    for (_, installed) in registration.installs.drain() {
                        uninstall(&registration.codec, installed, self.invocation_timeout);
                    }
                }
                self.failed.retain(|(registration_id, _)| *registration_id != id);
                tracing::debug!(registration = %id, error = %e, "listener registration rolled back");
                let _ = pending.reply.send(Err(e));
            }
        }
    }

    fn deregister(&mut self, id: Uuid) -> bool {
        let Some(mut registration) = self.registrations.remove(&id) else {
            return false;
        };
        for (_, installed) in registration.installs.drain() {
            uninstall(&registration.codec, installed, self.invocation_timeout);
        }
        self.failed.retain(|(registration_id, _)| *registration_id != id);
        tracing::debug!(registration = %id, "listener deregistered");
        true
    }

    fn connection_added(&mut self, connection: Arc<Connection>) {
        let connection_id = connection.id();
        if !connection.is_alive() || self.live.contains_key(&connection_id) {
            return;
        }
        let queue = spawn_install_queue(
            connection,
            self.local_only,
            self.invocation_timeout,
            self.outcomes.clone(),
        );
        self.live.insert(connection_id, queue);

        let ids: Vec<Uuid> = self.registrations.keys().copied().collect();
        for id in ids {
            self.enqueue(id, connection_id);
        }
    }

    fn connection_removed(&mut self, connection: &Arc<Connection>) {
        let connection_id = connection.id();
        // Dropping the queue lets its worker finish the backlog and exit.
        self.live.remove(&connection_id);
        for registration in self.registrations.values_mut() {
            registration.installs.remove(&connection_id);
        }
        self.failed.retain(|(_, failed_on)| *failed_on != connection_id);
    }

    fn retry_failed(&mut self) {
        if self.failed.is_empty() {
            return;
        }
        let failed: Vec<_> = self.failed.drain().collect();
        for (id, connection_id) in failed {
            self.enqueue(id, connection_id);
        }
    }
}

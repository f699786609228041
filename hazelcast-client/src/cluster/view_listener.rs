//! Keeps the member list and partition table current.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hazelcast_core::protocol::codecs::client::ClientAddClusterViewListener;
use hazelcast_core::protocol::Operation;
use parking_lot::Mutex;

use super::{ClusterService, PartitionService};
use crate::connection::{Connection, ConnectionId, ConnectionListener};
use crate::listener::{ClientEvent, EventHandler};

/// Applies pushed member lists and partition tables.
struct ClusterViewHandler {
    cluster: Arc<ClusterService>,
    partitions: Arc<PartitionService>,
}

impl EventHandler for ClusterViewHandler {
    fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::MembersView(view) => {
                self.cluster.apply_member_list(view.version, &view.members);
            }
            ClientEvent::PartitionsView(view) => {
                self.partitions
                    .apply_partition_table(view.version, &view.partitions);
            }
            other => tracing::debug!(event = other.name(), "unexpected event on cluster view listener"),
        }
    }
}

/// Pause before asking again after a registration attempt failed.
const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Default)]
struct State {
    live: BTreeMap<ConnectionId, Arc<Connection>>,
    owner: Option<ConnectionId>,
}

struct Inner {
    handler: Arc<dyn EventHandler>,
    invocation_timeout: Duration,
    retry_delay: Duration,
    state: Mutex<State>,
}

/// Holds the cluster view registration on exactly one live connection.
///
/// When the connection that carries it is removed, the registration moves
/// to another live connection. A failed attempt is retried after a pause
/// for as long as some connection is live.
pub(crate) struct ClusterViewListener {
    inner: Arc<Inner>,
}

impl ClusterViewListener {
    pub(crate) fn new(
        cluster: Arc<ClusterService>,
        partitions: Arc<PartitionService>,
        invocation_timeout: Duration,
    ) -> Self {
        Self::with_retry_delay(cluster, partitions, invocation_timeout, REGISTER_RETRY_DELAY)
    }

    fn with_retry_delay(
        cluster: Arc<ClusterService>,
        partitions: Arc<PartitionService>,
        invocation_timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler: Arc::new(ClusterViewHandler {
                    cluster,
                    partitions,
                }),
                invocation_timeout,
                retry_delay,
                state: Mutex::new(State::default()),
            }),
        }
    }

    #[cfg(test)]
    fn owner(&self) -> Option<ConnectionId> {
        self.inner.state.lock().owner
    }
}

impl Inner {
    fn try_register(self: &Arc<Self>) {
        let connection = {
            let mut state = self.state.lock();
            if state.owner.is_some() {
                return;
            }
            let Some(connection) = state
                .live
                .values()
                .find(|connection| connection.is_alive())
                .cloned()
            else {
                return;
            };
            state.owner = Some(connection.id());
            connection
        };

        let inner = Arc::downgrade(self);
        let handler = Arc::clone(&self.handler);
        let timeout = self.invocation_timeout;
        let retry_delay = self.retry_delay;
        tokio::spawn(async move {
            let request = ClientAddClusterViewListener::encode_request(&());
            let Err(e) = connection
                .invoke_with_event_handler(request, handler, timeout)
                .await
            else {
                tracing::debug!(
                    connection = %connection.id(),
                    "registered cluster view listener"
                );
                return;
            };

            tracing::warn!(
                connection = %connection.id(),
                error = %e,
                "failed to register cluster view listener"
            );
            {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                let mut state = inner.state.lock();
                if state.owner != Some(connection.id()) {
                    return;
                }
                state.owner = None;
            }

            tokio::time::sleep(retry_delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.try_register();
            }
        });
    }
}

impl ConnectionListener for ClusterViewListener {
    fn connection_added(&self, connection: &Arc<Connection>) {
        if !connection.is_alive() {
            return;
        }
        self.inner
            .state
            .lock()
            .live
            .insert(connection.id(), Arc::clone(connection));
        self.inner.try_register();
    }

    fn connection_removed(&self, connection: &Arc<Connection>) {
        {
            let mut state = self.inner.state.lock();
            state.live.remove(&connection.id());
            if state.owner != Some(connection.id()) {
                return;
            }
            state.owner = None;
        }
        self.inner.try_register();
    }
}

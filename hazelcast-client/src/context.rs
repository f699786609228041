//! Owning registry of live clients.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::client::HazelcastClient;

/// Tracks the clients created through it so they can be shut down together.
///
/// Clients register when they finish starting and deregister when they shut
/// down. A context is an ordinary value: create one per application (or per
/// test) instead of relying on process-wide state.
#[derive(Debug, Default)]
pub struct ClientContext {
    clients: Mutex<HashMap<Uuid, HazelcastClient>>,
}

impl ClientContext {
    /// Creates an empty context.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, client: HazelcastClient) {
        self.clients.lock().insert(client.client_uuid(), client);
    }

    pub(crate) fn deregister(&self, client_uuid: &Uuid) {
        self.clients.lock().remove(client_uuid);
    }

    /// Returns every live client.
    pub fn clients(&self) -> Vec<HazelcastClient> {
        self.clients.lock().values().cloned().collect()
    }

    /// Returns the live client with the given instance name.
    pub fn client(&self, name: &str) -> Option<HazelcastClient> {
        self.clients
            .lock()
            .values()
            .find(|client| client.name() == name)
            .cloned()
    }

    /// Returns the number of live clients.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Returns true if no client is live.
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Shuts down every client registered in this context.
    pub async fn shutdown_all(&self) {
        let clients: Vec<_> = self.clients.lock().drain().map(|(_, client)| client).collect();
        tracing::info!(clients = clients.len(), "shutting down all clients");
        for client in clients {
            client.shutdown().await;
        }
    }
}

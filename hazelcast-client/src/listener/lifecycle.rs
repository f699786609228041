//! Client lifecycle events.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::broadcast;

const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// Transitions of a client, in the order they normally occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// `start` was called.
    Starting,
    /// Startup finished; with async start this precedes the first connection.
    Started,
    /// The first connection of a session is live.
    ClientConnected,
    /// The last live connection was lost.
    ClientDisconnected,
    /// The client reconnected to a cluster with a different cluster id.
    ClientChangedCluster,
    /// Shutdown began.
    ShuttingDown,
    /// Shutdown completed. No further events follow.
    Shutdown,
}

impl LifecycleEvent {
    /// Returns the event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::ClientConnected => "CLIENT_CONNECTED",
            Self::ClientDisconnected => "CLIENT_DISCONNECTED",
            Self::ClientChangedCluster => "CLIENT_CHANGED_CLUSTER",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Publishes lifecycle events to subscribers and remembers the last one.
#[derive(Debug)]
pub(crate) struct LifecycleBroadcaster {
    sender: broadcast::Sender<LifecycleEvent>,
    last: Mutex<Option<LifecycleEvent>>,
}

impl LifecycleBroadcaster {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self {
            sender,
            last: Mutex::new(None),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn fire(&self, event: LifecycleEvent) {
        *self.last.lock() = Some(event);
        tracing::info!(event = %event, "client lifecycle");
        let _ = self.sender.send(event);
    }

    pub(crate) fn last(&self) -> Option<LifecycleEvent> {
        *self.last.lock()
    }
}

//! Delivers decoded events to their handlers off the reader tasks.

use std::sync::Arc;

use hazelcast_core::protocol::ClientMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::event::{decode_event, EventHandler};
use crate::connection::Connection;

struct DispatchedEvent {
    connection: Arc<Connection>,
    handler: Arc<dyn EventHandler>,
    message: ClientMessage,
}

/// Handle to the dispatcher task.
///
/// Events from every connection go through one task, so a handler sees its
/// events in arrival order. An event that cannot be decoded closes the
/// connection it came from.
#[derive(Debug, Clone)]
pub(crate) struct EventDispatcher {
    sender: mpsc::UnboundedSender<DispatchedEvent>,
}

impl EventDispatcher {
    /// Spawns the dispatcher task. It ends once every handle is dropped.
    pub(crate) fn start() -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(receiver));
        (Self { sender }, task)
    }

    pub(crate) fn dispatch(
        &self,
        connection: Arc<Connection>,
        handler: Arc<dyn EventHandler>,
        message: ClientMessage,
    ) {
        let event = DispatchedEvent {
            connection,
            handler,
            message,
        };
        if self.sender.send(event).is_err() {
            tracing::debug!("event dispatcher stopped, dropping event");
        }
    }
}

async fn run(mut receiver: mpsc::UnboundedReceiver<DispatchedEvent>) {
    while let Some(DispatchedEvent {
        connection,
        handler,
        message,
    }) = receiver.recv().await
    {
        match decode_event(&message) {
            Ok(event) => {
                tracing::trace!(connection = %connection.id(), event = event.name(), "dispatching event");
                handler.handle(event);
            }
            Err(e) => {
                tracing::warn!(
                    connection = %connection.id(),
                    error = %e,
                    "undecodable event, closing connection"
                );
                connection.close(format!("undecodable event: {}", e));
            }
        }
    }
}

impl std::fmt::Debug for DispatchedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchedEvent")
            .field("connection", &self.connection.id())
            .field("message_type", &self.message.message_type())
            .finish()
    }
}

//! Decoded server-pushed events and the handler contract.

use std::collections::HashMap;
use std::sync::OnceLock;

use hazelcast_core::protocol::codecs::client::{
    MembersViewEvent, MembersViewPayload, PartitionsViewEvent, PartitionsViewPayload,
};
use hazelcast_core::protocol::codecs::map::{
    BatchInvalidationPayload, InvalidationPayload, MapBatchInvalidationEvent, MapInvalidationEvent,
};
use hazelcast_core::protocol::codecs::replicated_map::{EntryEventPayload, ReplicatedMapEntryEvent};
use hazelcast_core::protocol::codecs::topic::{TopicMessageEvent, TopicMessagePayload};
use hazelcast_core::protocol::{ClientMessage, Event};
use hazelcast_core::{HazelcastError, Result};

/// An event pushed by a member for a listener registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A message published to a topic.
    TopicMessage(TopicMessagePayload),
    /// A single near cache invalidation.
    MapInvalidation(InvalidationPayload),
    /// A batch of near cache invalidations.
    MapBatchInvalidation(BatchInvalidationPayload),
    /// A replicated map entry change.
    ReplicatedMapEntry(EntryEventPayload),
    /// A new member list.
    MembersView(MembersViewPayload),
    /// A new partition table.
    PartitionsView(PartitionsViewPayload),
}

impl ClientEvent {
    /// Returns the event name, as registered in the codec registry.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TopicMessage(_) => TopicMessageEvent::NAME,
            Self::MapInvalidation(_) => MapInvalidationEvent::NAME,
            Self::MapBatchInvalidation(_) => MapBatchInvalidationEvent::NAME,
            Self::ReplicatedMapEntry(_) => ReplicatedMapEntryEvent::NAME,
            Self::MembersView(_) => MembersViewEvent::NAME,
            Self::PartitionsView(_) => PartitionsViewEvent::NAME,
        }
    }
}

/// Receives the events of one listener registration.
///
/// Handlers run on the event dispatcher task and must not block. Closures
/// taking a [`ClientEvent`] implement this trait.
pub trait EventHandler: Send + Sync {
    /// Called once per event, in the order the connection received them.
    fn handle(&self, event: ClientEvent);
}

impl<F> EventHandler for F
where
    F: Fn(ClientEvent) + Send + Sync,
{
    fn handle(&self, event: ClientEvent) {
        self(event)
    }
}

type DecodeFn = fn(&ClientMessage) -> Result<ClientEvent>;

fn decode_topic(message: &ClientMessage) -> Result<ClientEvent> {
    TopicMessageEvent::decode_event(message).map(ClientEvent::TopicMessage)
}

fn decode_map_invalidation(message: &ClientMessage) -> Result<ClientEvent> {
    MapInvalidationEvent::decode_event(message).map(ClientEvent::MapInvalidation)
}

fn decode_map_batch_invalidation(message: &ClientMessage) -> Result<ClientEvent> {
    MapBatchInvalidationEvent::decode_event(message).map(ClientEvent::MapBatchInvalidation)
}

fn decode_replicated_map_entry(message: &ClientMessage) -> Result<ClientEvent> {
    ReplicatedMapEntryEvent::decode_event(message).map(ClientEvent::ReplicatedMapEntry)
}

fn decode_members_view(message: &ClientMessage) -> Result<ClientEvent> {
    MembersViewEvent::decode_event(message).map(ClientEvent::MembersView)
}

fn decode_partitions_view(message: &ClientMessage) -> Result<ClientEvent> {
    PartitionsViewEvent::decode_event(message).map(ClientEvent::PartitionsView)
}

fn decode_table() -> &'static HashMap<i32, DecodeFn> {
    static TABLE: OnceLock<HashMap<i32, DecodeFn>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let entries: [(i32, DecodeFn); 6] = [
            (TopicMessageEvent::MESSAGE_TYPE, decode_topic),
            (MapInvalidationEvent::MESSAGE_TYPE, decode_map_invalidation),
            (
                MapBatchInvalidationEvent::MESSAGE_TYPE,
                decode_map_batch_invalidation,
            ),
            (ReplicatedMapEntryEvent::MESSAGE_TYPE, decode_replicated_map_entry),
            (MembersViewEvent::MESSAGE_TYPE, decode_members_view),
            (PartitionsViewEvent::MESSAGE_TYPE, decode_partitions_view),
        ];
        entries.into_iter().collect()
    })
}

/// Decodes a pushed event message.
///
/// # Errors
///
/// Returns [`HazelcastError::Protocol`] for unknown event types and for
/// payloads that do not match their schema.
pub fn decode_event(message: &ClientMessage) -> Result<ClientEvent> {
    let message_type = message
        .message_type()
        .ok_or_else(|| HazelcastError::Protocol("event without an initial frame".to_string()))?;
    let decode = decode_table().get(&message_type).ok_or_else(|| {
        HazelcastError::Protocol(format!("unknown event type 0x{:06X}", message_type))
    })?;
    decode(message)
}

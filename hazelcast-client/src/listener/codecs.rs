//! Add/remove request pairs for each listener kind.

use hazelcast_core::protocol::codecs::map::{
    AddNearCacheInvalidationListenerRequest, MapAddNearCacheInvalidationListener,
    MapRemoveEntryListener,
};
use hazelcast_core::protocol::codecs::replicated_map::{
    AddNearCacheEntryListenerRequest, ReplicatedMapAddNearCacheEntryListener,
    ReplicatedMapRemoveEntryListener,
};
use hazelcast_core::protocol::codecs::topic::{
    AddMessageListenerRequest, TopicAddMessageListener, TopicRemoveMessageListener,
};
use hazelcast_core::protocol::codecs::RemoveListenerRequest;
use hazelcast_core::protocol::{ClientMessage, Operation};
use hazelcast_core::Result;
use uuid::Uuid;

/// Builds the requests that install and remove one kind of listener.
///
/// The listener registry calls `encode_add_request` once per connection, so
/// implementations must produce a fresh message every time.
pub trait ListenerMessageCodec: Send + Sync + std::fmt::Debug {
    /// Encodes the add request.
    fn encode_add_request(&self, local_only: bool) -> ClientMessage;

    /// Extracts the server-side registration id from the add response.
    fn decode_add_response(&self, message: &ClientMessage) -> Result<Uuid>;

    /// Encodes the remove request for a server-side registration id.
    fn encode_remove_request(&self, registration_id: Uuid) -> ClientMessage;
}

/// Message listener on a topic.
#[derive(Debug, Clone)]
pub struct TopicListenerCodec {
    name: String,
}

impl TopicListenerCodec {
    /// Creates a codec for the named topic.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ListenerMessageCodec for TopicListenerCodec {
    fn encode_add_request(&self, local_only: bool) -> ClientMessage {
        TopicAddMessageListener::encode_request(&AddMessageListenerRequest {
            name: self.name.clone(),
            local_only,
        })
    }

    fn decode_add_response(&self, message: &ClientMessage) -> Result<Uuid> {
        TopicAddMessageListener::decode_response(message).map(|r| r.response)
    }

    fn encode_remove_request(&self, registration_id: Uuid) -> ClientMessage {
        TopicRemoveMessageListener::encode_request(&RemoveListenerRequest {
            name: self.name.clone(),
            registration_id,
        })
    }
}

/// Near cache invalidation listener on a map.
#[derive(Debug, Clone)]
pub struct MapInvalidationListenerCodec {
    name: String,
    listener_flags: i32,
}

impl MapInvalidationListenerCodec {
    /// Entry event flag for invalidation events.
    pub const INVALIDATION_FLAG: i32 = 1 << 8;

    /// Creates a codec for the named map.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener_flags: Self::INVALIDATION_FLAG,
        }
    }
}

impl ListenerMessageCodec for MapInvalidationListenerCodec {
    fn encode_add_request(&self, local_only: bool) -> ClientMessage {
        MapAddNearCacheInvalidationListener::encode_request(
            &AddNearCacheInvalidationListenerRequest {
                name: self.name.clone(),
                listener_flags: self.listener_flags,
                local_only,
            },
        )
    }

    fn decode_add_response(&self, message: &ClientMessage) -> Result<Uuid> {
        MapAddNearCacheInvalidationListener::decode_response(message).map(|r| r.response)
    }

    fn encode_remove_request(&self, registration_id: Uuid) -> ClientMessage {
        MapRemoveEntryListener::encode_request(&RemoveListenerRequest {
            name: self.name.clone(),
            registration_id,
        })
    }
}

/// Entry listener keeping a replicated map near cache fresh.
#[derive(Debug, Clone)]
pub struct ReplicatedMapNearCacheListenerCodec {
    name: String,
    include_value: bool,
}

impl ReplicatedMapNearCacheListenerCodec {
    /// Creates a codec for the named replicated map.
    pub fn new(name: impl Into<String>, include_value: bool) -> Self {
        Self {
            name: name.into(),
            include_value,
        }
    }
}

impl ListenerMessageCodec for ReplicatedMapNearCacheListenerCodec {
    fn encode_add_request(&self, local_only: bool) -> ClientMessage {
        ReplicatedMapAddNearCacheEntryListener::encode_request(&AddNearCacheEntryListenerRequest {
            name: self.name.clone(),
            include_value: self.include_value,
            local_only,
        })
    }

    fn decode_add_response(&self, message: &ClientMessage) -> Result<Uuid> {
        ReplicatedMapAddNearCacheEntryListener::decode_response(message).map(|r| r.response)
    }

    fn encode_remove_request(&self, registration_id: Uuid) -> ClientMessage {
        ReplicatedMapRemoveEntryListener::encode_request(&RemoveListenerRequest {
            name: self.name.clone(),
            registration_id,
        })
    }
}

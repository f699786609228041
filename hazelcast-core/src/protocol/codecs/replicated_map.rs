//! Replicated map listener and key set operations.

use hazelcast_derive::HazelcastCodec;
use uuid::Uuid;

use super::{BoolResponse, RegistrationIdResponse, RemoveListenerRequest};
use crate::protocol::builtin::Data;
use crate::protocol::constants::*;
use crate::protocol::operation::{Event, Operation};

/// Adds an entry listener used to keep a near cache fresh.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct AddNearCacheEntryListenerRequest {
    /// Replicated map name.
    pub name: String,
    /// Whether events carry values.
    #[hazelcast(fixed)]
    pub include_value: bool,
    /// Deliver only events originating on the receiving member.
    #[hazelcast(fixed)]
    pub local_only: bool,
}

/// An entry event.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct EntryEventPayload {
    /// Entry event type bit.
    #[hazelcast(fixed)]
    pub event_type: i32,
    /// Member the event originated on.
    #[hazelcast(fixed)]
    pub uuid: Option<Uuid>,
    /// Entries affected by map-wide events such as clear.
    #[hazelcast(fixed)]
    pub number_of_affected_entries: i32,
    /// Entry key.
    pub key: Option<Data>,
    /// New value.
    pub value: Option<Data>,
    /// Previous value.
    pub old_value: Option<Data>,
    /// Value proposed by a merge.
    pub merging_value: Option<Data>,
}

/// Names a replicated map.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct KeySetRequest {
    /// Replicated map name.
    pub name: String,
}

/// Every key of a replicated map.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct KeySetResponse {
    /// Serialized keys.
    pub response: Vec<Data>,
}

/// `ReplicatedMap.AddNearCacheEntryListener`.
pub struct ReplicatedMapAddNearCacheEntryListener;

impl Operation for ReplicatedMapAddNearCacheEntryListener {
    const NAME: &'static str = "ReplicatedMap.AddNearCacheEntryListener";
    const REQUEST_MESSAGE_TYPE: i32 = REPLICATED_MAP_ADD_NEAR_CACHE_ENTRY_LISTENER;
    const RESPONSE_MESSAGE_TYPE: i32 = REPLICATED_MAP_ADD_NEAR_CACHE_ENTRY_LISTENER_RESPONSE;
    const RETRYABLE: bool = false;

    type Request = AddNearCacheEntryListenerRequest;
    type Response = RegistrationIdResponse;
}

/// Entry push of `ReplicatedMap.AddNearCacheEntryListener`.
pub struct ReplicatedMapEntryEvent;

impl Event for ReplicatedMapEntryEvent {
    const NAME: &'static str = "ReplicatedMap.AddNearCacheEntryListener.Entry";
    const MESSAGE_TYPE: i32 = REPLICATED_MAP_ENTRY_EVENT;

    type Payload = EntryEventPayload;
}

/// `ReplicatedMap.RemoveEntryListener`.
pub struct ReplicatedMapRemoveEntryListener;

impl Operation for ReplicatedMapRemoveEntryListener {
    const NAME: &'static str = "ReplicatedMap.RemoveEntryListener";
    const REQUEST_MESSAGE_TYPE: i32 = REPLICATED_MAP_REMOVE_ENTRY_LISTENER;
    const RESPONSE_MESSAGE_TYPE: i32 = REPLICATED_MAP_REMOVE_ENTRY_LISTENER_RESPONSE;
    const RETRYABLE: bool = true;

    type Request = RemoveListenerRequest;
    type Response = BoolResponse;
}

/// `ReplicatedMap.KeySet`.
pub struct ReplicatedMapKeySet;

impl Operation for ReplicatedMapKeySet {
    const NAME: &'static str = "ReplicatedMap.KeySet";
    const REQUEST_MESSAGE_TYPE: i32 = REPLICATED_MAP_KEY_SET;
    const RESPONSE_MESSAGE_TYPE: i32 = REPLICATED_MAP_KEY_SET_RESPONSE;
    const RETRYABLE: bool = true;

    type Request = KeySetRequest;
    type Response = KeySetResponse;
}

//! Map near-cache invalidation listener operations.

use hazelcast_derive::HazelcastCodec;
use uuid::Uuid;

use super::{BoolResponse, RegistrationIdResponse, RemoveListenerRequest};
use crate::protocol::builtin::Data;
use crate::protocol::constants::*;
use crate::protocol::operation::{Event, Operation};

/// Adds a near-cache invalidation listener.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct AddNearCacheInvalidationListenerRequest {
    /// Map name.
    pub name: String,
    /// Entry event flags the listener is interested in.
    #[hazelcast(fixed)]
    pub listener_flags: i32,
    /// Deliver only invalidations originating on the receiving member.
    #[hazelcast(fixed)]
    pub local_only: bool,
}

/// Invalidation of a single key, or of the whole map when `key` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct InvalidationPayload {
    /// Member that caused the invalidation.
    #[hazelcast(fixed)]
    pub source_uuid: Option<Uuid>,
    /// UUID of the partition the key belongs to.
    #[hazelcast(fixed)]
    pub partition_uuid: Uuid,
    /// Invalidation sequence within the partition.
    #[hazelcast(fixed)]
    pub sequence: i64,
    /// Invalidated key.
    pub key: Option<Data>,
}

/// Several invalidations delivered together; the lists are parallel.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct BatchInvalidationPayload {
    /// Invalidated keys.
    pub keys: Vec<Data>,
    /// Source members.
    pub source_uuids: Vec<Uuid>,
    /// Partition UUIDs.
    pub partition_uuids: Vec<Uuid>,
    /// Sequences.
    pub sequences: Vec<i64>,
}

/// `Map.AddNearCacheInvalidationListener`.
pub struct MapAddNearCacheInvalidationListener;

impl Operation for MapAddNearCacheInvalidationListener {
    const NAME: &'static str = "Map.AddNearCacheInvalidationListener";
    const REQUEST_MESSAGE_TYPE: i32 = MAP_ADD_NEAR_CACHE_INVALIDATION_LISTENER;
    const RESPONSE_MESSAGE_TYPE: i32 = MAP_ADD_NEAR_CACHE_INVALIDATION_LISTENER_RESPONSE;
    const RETRYABLE: bool = false;

    type Request = AddNearCacheInvalidationListenerRequest;
    type Response = RegistrationIdResponse;
}

/// Single-key push of `Map.AddNearCacheInvalidationListener`.
pub struct MapInvalidationEvent;

impl Event for MapInvalidationEvent {
    const NAME: &'static str = "Map.AddNearCacheInvalidationListener.IMapInvalidation";
    const MESSAGE_TYPE: i32 = MAP_INVALIDATION_EVENT;

    type Payload = InvalidationPayload;
}

/// Batched push of `Map.AddNearCacheInvalidationListener`.
pub struct MapBatchInvalidationEvent;

impl Event for MapBatchInvalidationEvent {
    const NAME: &'static str = "Map.AddNearCacheInvalidationListener.IMapBatchInvalidation";
    const MESSAGE_TYPE: i32 = MAP_BATCH_INVALIDATION_EVENT;

    type Payload = BatchInvalidationPayload;
}

/// `Map.RemoveEntryListener`, which also removes invalidation listeners.
pub struct MapRemoveEntryListener;

impl Operation for MapRemoveEntryListener {
    const NAME: &'static str = "Map.RemoveEntryListener";
    const REQUEST_MESSAGE_TYPE: i32 = MAP_REMOVE_ENTRY_LISTENER;
    const RESPONSE_MESSAGE_TYPE: i32 = MAP_REMOVE_ENTRY_LISTENER_RESPONSE;
    const RETRYABLE: bool = true;

    type Request = RemoveListenerRequest;
    type Response = BoolResponse;
}

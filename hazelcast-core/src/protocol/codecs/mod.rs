//! Built-in operation and event codecs.
//!
//! Each operation is a unit struct implementing [`Operation`](super::Operation);
//! its parameters are plain structs deriving `HazelcastCodec`.

pub mod client;
pub mod error;
pub mod map;
pub mod replicated_map;
pub mod topic;
pub mod transaction;

use hazelcast_derive::HazelcastCodec;
use uuid::Uuid;

/// Response carrying the server-assigned id of a new listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, HazelcastCodec)]
pub struct RegistrationIdResponse {
    /// Server-side registration id.
    #[hazelcast(fixed)]
    pub response: Uuid,
}

/// Response carrying a single boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, HazelcastCodec)]
pub struct BoolResponse {
    /// Result flag.
    #[hazelcast(fixed)]
    pub response: bool,
}

/// Request removing a listener registration from a named structure.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct RemoveListenerRequest {
    /// Structure name.
    pub name: String,
    /// Server-side registration id returned when the listener was added.
    #[hazelcast(fixed)]
    pub registration_id: Uuid,
}

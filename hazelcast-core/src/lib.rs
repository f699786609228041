//! Core types and protocols for Hazelcast.
//!
//! Everything here is transport-agnostic: frames and messages, the stream
//! codec used on sockets, the operation codecs, and the error taxonomy shared
//! with `hazelcast-client`.

#![warn(missing_docs)]

// Lets `#[derive(HazelcastCodec)]` expand to `hazelcast_core::…` paths inside this crate too.
extern crate self as hazelcast_core;

pub mod error;
pub mod protocol;

#[doc(hidden)]
pub use bytes;

pub use error::{HazelcastError, Result};
pub use hazelcast_derive::HazelcastCodec;
pub use protocol::{ClientMessage, Data, Operation};

//! Hazelcast Open Binary Protocol implementation.
//!
//! This module provides the wire model (frames and messages), the stream
//! codec, the field codecs every operation is built from, and the built-in
//! operation codecs with their registry.

mod builtin;
mod client_message;
mod codec;
pub mod codecs;
pub mod constants;
mod frame;
mod operation;
mod registry;

pub use builtin::{Data, FixedSizeCodec, FrameCodec, MessageCodec};
pub use client_message::{
    compute_partition_hash, next_correlation_id, ClientMessage, ForwardFrameIterator,
};
pub use codec::ClientMessageCodec;
pub use constants::*;
pub use frame::Frame;
pub use operation::{expect_message_type, Event, Operation};
pub use registry::{
    builtin_registry, codec_registry, CodecDescriptor, CodecKind, CodecRegistry,
    CodecRegistryBuilder,
};

//! Derive macro for Hazelcast client protocol parameter schemas.
//!
//! [`HazelcastCodec`] turns a plain struct into the encode/decode pair for a
//! request, response or event, or (with `data_structure`) into a nested
//! custom type that can appear inside other messages.
//!
//! # Example
//!
//! ```ignore
//! use hazelcast_derive::HazelcastCodec;
//!
//! #[derive(HazelcastCodec)]
//! struct AddMessageListenerRequest {
//!     name: String,
//!     #[hazelcast(fixed)]
//!     local_only: bool,
//! }
//! ```

extern crate proc_macro;

mod codec;

use proc_macro::TokenStream;

/// Derives a protocol codec for a struct with named fields.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[hazelcast(data_structure)]`: implements `FrameCodec` instead of
///   `MessageCodec`: the value is bracketed by begin/end structure frames,
///   its fixed fields share one leading frame, and unknown trailing frames are
///   skipped when decoding.
///
/// ## Field-level
/// - `#[hazelcast(fixed)]`: the field implements `FixedSizeCodec` and is
///   packed into the initial frame, after the message header. Fixed fields
///   keep their declaration order.
///
/// Every other field must implement `FrameCodec` and becomes one or more
/// child frames, in declaration order.
#[proc_macro_derive(HazelcastCodec, attributes(hazelcast))]
pub fn derive_codec(input: TokenStream) -> TokenStream {
    codec::derive_codec_impl(input)
}

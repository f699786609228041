//! Registry of every message type the client understands.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::codecs::{client, map, replicated_map, topic, transaction};
use super::constants::EXCEPTION_MESSAGE_TYPE;
use super::operation::{Event, Operation};
use crate::error::{HazelcastError, Result};

/// The role a message type plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Client to member request.
    Request,
    /// Member to client response.
    Response,
    /// Member to client pushed event.
    Event,
    /// Error message sent in place of a response.
    Error,
}

/// What the registry knows about one message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecDescriptor {
    /// Operation or event name.
    pub name: &'static str,
    /// Message type tag.
    pub message_type: i32,
    /// Role of the tag.
    pub kind: CodecKind,
    /// Retryability of the owning operation; false for events and errors.
    pub retryable: bool,
}

/// An immutable tag to descriptor table. Tags are unique.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    by_type: HashMap<i32, CodecDescriptor>,
}

impl CodecRegistry {
    /// Starts an empty registry builder.
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::default()
    }

    /// Looks up a message type.
    pub fn lookup(&self, message_type: i32) -> Option<&CodecDescriptor> {
        self.by_type.get(&message_type)
    }

    /// Returns the number of registered tags.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Iterates over every descriptor in no particular order.
    pub fn descriptors(&self) -> impl Iterator<Item = &CodecDescriptor> {
        self.by_type.values()
    }
}

/// Collects descriptors and rejects duplicate tags on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct CodecRegistryBuilder {
    descriptors: Vec<CodecDescriptor>,
}

impl CodecRegistryBuilder {
    /// Registers the request and response tags of an operation.
    pub fn operation<O: Operation>(mut self) -> Self {
        self.descriptors.push(CodecDescriptor {
            name: O::NAME,
            message_type: O::REQUEST_MESSAGE_TYPE,
            kind: CodecKind::Request,
            retryable: O::RETRYABLE,
        });
        self.descriptors.push(CodecDescriptor {
            name: O::NAME,
            message_type: O::RESPONSE_MESSAGE_TYPE,
            kind: CodecKind::Response,
            retryable: O::RETRYABLE,
        });
        self
    }

    /// Registers an event tag.
    pub fn event<E: Event>(mut self) -> Self {
        self.descriptors.push(CodecDescriptor {
            name: E::NAME,
            message_type: E::MESSAGE_TYPE,
            kind: CodecKind::Event,
            retryable: false,
        });
        self
    }

    /// Registers a raw descriptor.
    pub fn descriptor(mut self, descriptor: CodecDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Builds the registry, failing on the first tag registered twice.
    pub fn build(self) -> Result<CodecRegistry> {
        let mut by_type = HashMap::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors {
            if let Some(existing) = by_type.insert(descriptor.message_type, descriptor) {
                return Err(HazelcastError::Configuration(format!(
                    "message type {:#08x} registered by both {} and {}",
                    descriptor.message_type, existing.name, descriptor.name
                )));
            }
        }
        Ok(CodecRegistry { by_type })
    }
}

/// Builds the table of built-in operations and events.
pub fn builtin_registry() -> Result<CodecRegistry> {
    CodecRegistry::builder()
        .descriptor(CodecDescriptor {
            name: "Error",
            message_type: EXCEPTION_MESSAGE_TYPE,
            kind: CodecKind::Error,
            retryable: false,
        })
        .operation::<client::ClientAuthentication>()
        .operation::<client::ClientAuthenticationCustom>()
        .operation::<client::ClientAddClusterViewListener>()
        .event::<client::MembersViewEvent>()
        .event::<client::PartitionsViewEvent>()
        .operation::<client::ClientPing>()
        .operation::<topic::TopicPublish>()
        .operation::<topic::TopicAddMessageListener>()
        .event::<topic::TopicMessageEvent>()
        .operation::<topic::TopicRemoveMessageListener>()
        .operation::<map::MapAddNearCacheInvalidationListener>()
        .event::<map::MapInvalidationEvent>()
        .event::<map::MapBatchInvalidationEvent>()
        .operation::<map::MapRemoveEntryListener>()
        .operation::<replicated_map::ReplicatedMapAddNearCacheEntryListener>()
        .event::<replicated_map::ReplicatedMapEntryEvent>()
        .operation::<replicated_map::ReplicatedMapRemoveEntryListener>()
        .operation::<replicated_map::ReplicatedMapKeySet>()
        .operation::<transaction::XaTransactionRollback>()
        .build()
}

/// Returns the process-wide registry of built-in codecs.
pub fn codec_registry() -> &'static CodecRegistry {
    static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        // The built-in tags are constants; builtin_registry_has_unique_tags covers this.
        builtin_registry().expect("built-in message types are unique")
    })
}

//! Topic publish and message listener operations.

use hazelcast_derive::HazelcastCodec;
use uuid::Uuid;

use super::{BoolResponse, RegistrationIdResponse, RemoveListenerRequest};
use crate::protocol::builtin::Data;
use crate::protocol::constants::*;
use crate::protocol::operation::{Event, Operation};

/// Publishes one message.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct PublishRequest {
    /// Topic name.
    pub name: String,
    /// Serialized message.
    pub message: Data,
}

/// Adds a message listener.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct AddMessageListenerRequest {
    /// Topic name.
    pub name: String,
    /// Deliver only messages published through the receiving member.
    #[hazelcast(fixed)]
    pub local_only: bool,
}

/// A message delivered to a topic listener.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct TopicMessagePayload {
    /// Publish time in epoch milliseconds.
    #[hazelcast(fixed)]
    pub publish_time: i64,
    /// UUID of the publishing member, if known.
    #[hazelcast(fixed)]
    pub publishing_member: Option<Uuid>,
    /// Serialized message.
    pub item: Data,
}

/// `Topic.Publish`.
pub struct TopicPublish;

impl Operation for TopicPublish {
    const NAME: &'static str = "Topic.Publish";
    const REQUEST_MESSAGE_TYPE: i32 = TOPIC_PUBLISH;
    const RESPONSE_MESSAGE_TYPE: i32 = TOPIC_PUBLISH_RESPONSE;
    const RETRYABLE: bool = false;

    type Request = PublishRequest;
    type Response = ();
}

/// `Topic.AddMessageListener`.
pub struct TopicAddMessageListener;

impl Operation for TopicAddMessageListener {
    const NAME: &'static str = "Topic.AddMessageListener";
    const REQUEST_MESSAGE_TYPE: i32 = TOPIC_ADD_MESSAGE_LISTENER;
    const RESPONSE_MESSAGE_TYPE: i32 = TOPIC_ADD_MESSAGE_LISTENER_RESPONSE;
    const RETRYABLE: bool = false;

    type Request = AddMessageListenerRequest;
    type Response = RegistrationIdResponse;
}

/// Message push of `Topic.AddMessageListener`.
pub struct TopicMessageEvent;

impl Event for TopicMessageEvent {
    const NAME: &'static str = "Topic.AddMessageListener.Topic";
    const MESSAGE_TYPE: i32 = TOPIC_EVENT;

    type Payload = TopicMessagePayload;
}

/// `Topic.RemoveMessageListener`.
pub struct TopicRemoveMessageListener;

impl Operation for TopicRemoveMessageListener {
    const NAME: &'static str = "Topic.RemoveMessageListener";
    const REQUEST_MESSAGE_TYPE: i32 = TOPIC_REMOVE_MESSAGE_LISTENER;
    const RESPONSE_MESSAGE_TYPE: i32 = TOPIC_REMOVE_MESSAGE_LISTENER_RESPONSE;
    const RETRYABLE: bool = true;

    type Request = RemoveListenerRequest;
    type Response = BoolResponse;
}

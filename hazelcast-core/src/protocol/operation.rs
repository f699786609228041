//! Operation and event contracts.
//!
//! An operation is a pure, stateless pair of codecs keyed by a request and a
//! response tag. Both directions are available so that members and test
//! doubles decode requests with the same schema the client encodes them with.

use super::builtin::MessageCodec;
use super::client_message::ClientMessage;
use super::constants::*;
use crate::error::{HazelcastError, Result};

/// Fails with a protocol error unless `message` carries `expected` as its type.
pub fn expect_message_type(message: &ClientMessage, expected: i32) -> Result<()> {
    match message.message_type() {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(HazelcastError::Protocol(format!(
            "expected message type {:#08x}, got {:#08x}",
            expected, actual
        ))),
        None => Err(HazelcastError::Protocol(
            "message has no type field".to_string(),
        )),
    }
}

/// A request/response operation of the client protocol.
pub trait Operation {
    /// Operation name, e.g. `Client.Ping`.
    const NAME: &'static str;
    /// Tag of the request message.
    const REQUEST_MESSAGE_TYPE: i32;
    /// Tag of the response message.
    const RESPONSE_MESSAGE_TYPE: i32;
    /// Whether the request may be sent again after its connection was lost.
    const RETRYABLE: bool;

    /// Request parameters.
    type Request: MessageCodec;
    /// Response parameters.
    type Response: MessageCodec;

    /// Encodes a request that is not routed to a partition.
    fn encode_request(request: &Self::Request) -> ClientMessage {
        Self::encode_request_on_partition(request, PARTITION_ID_ANY)
    }

    /// Encodes a request routed to `partition_id`.
    fn encode_request_on_partition(request: &Self::Request, partition_id: i32) -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(Self::REQUEST_MESSAGE_TYPE, partition_id);
        message.set_retryable(Self::RETRYABLE);
        message.set_operation_name(Self::NAME);
        request.encode_fields(&mut message);
        message
    }

    /// Decodes a request on the member side.
    fn decode_request(message: &ClientMessage) -> Result<Self::Request> {
        expect_message_type(message, Self::REQUEST_MESSAGE_TYPE)?;
        Self::Request::decode_fields(message, REQUEST_HEADER_SIZE)
    }

    /// Encodes a response on the member side.
    ///
    /// The correlation ID must still be copied from the request.
    fn encode_response(response: &Self::Response) -> ClientMessage {
        let mut message = ClientMessage::create_response(Self::RESPONSE_MESSAGE_TYPE);
        response.encode_fields(&mut message);
        message
    }

    /// Decodes a response.
    fn decode_response(message: &ClientMessage) -> Result<Self::Response> {
        expect_message_type(message, Self::RESPONSE_MESSAGE_TYPE)?;
        Self::Response::decode_fields(message, RESPONSE_HEADER_SIZE)
    }
}

/// A server-pushed event of the client protocol.
pub trait Event {
    /// Event name used in diagnostics.
    const NAME: &'static str;
    /// Tag of the event message.
    const MESSAGE_TYPE: i32;

    /// Event parameters.
    type Payload: MessageCodec;

    /// Encodes an event on the member side.
    fn encode_event(payload: &Self::Payload, partition_id: i32) -> ClientMessage {
        let mut message = ClientMessage::create_event(Self::MESSAGE_TYPE, partition_id);
        payload.encode_fields(&mut message);
        message
    }

    /// Decodes an event.
    fn decode_event(message: &ClientMessage) -> Result<Self::Payload> {
        expect_message_type(message, Self::MESSAGE_TYPE)?;
        Self::Payload::decode_fields(message, EVENT_HEADER_SIZE)
    }
}

//! The error message a member sends in place of a response.

use hazelcast_derive::HazelcastCodec;

use crate::error::HazelcastError;
use crate::protocol::builtin::MessageCodec;
use crate::protocol::client_message::ClientMessage;
use crate::protocol::constants::*;
use crate::protocol::operation::expect_message_type;

/// One link of a server-side exception chain.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
#[hazelcast(data_structure)]
pub struct ErrorHolder {
    /// Protocol error code.
    #[hazelcast(fixed)]
    pub error_code: i32,
    /// Exception class name.
    pub class_name: String,
    /// Exception message.
    pub message: Option<String>,
}

/// Body of an error message: the cause chain, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct ErrorMessage {
    /// Exception chain.
    pub errors: Vec<ErrorHolder>,
}

/// Returns true if `message` is an error message rather than a regular response.
pub fn is_error_message(message: &ClientMessage) -> bool {
    message.message_type() == Some(EXCEPTION_MESSAGE_TYPE)
}

/// Builds an error message; the correlation ID must still be set.
pub fn encode_error(error_code: i32, class_name: &str, message: Option<&str>) -> ClientMessage {
    let mut encoded = ClientMessage::create_response(EXCEPTION_MESSAGE_TYPE);
    ErrorMessage {
        errors: vec![ErrorHolder {
            error_code,
            class_name: class_name.to_string(),
            message: message.map(str::to_string),
        }],
    }
    .encode_fields(&mut encoded);
    encoded
}

/// Converts an error message into [`HazelcastError::Server`].
///
/// A message that cannot be decoded yields the protocol error instead.
pub fn decode_error(message: &ClientMessage) -> HazelcastError {
    let decoded = expect_message_type(message, EXCEPTION_MESSAGE_TYPE)
        .and_then(|_| ErrorMessage::decode_fields(message, RESPONSE_HEADER_SIZE));
    match decoded {
        Ok(body) => match body.errors.into_iter().next() {
            Some(holder) => HazelcastError::Server {
                error_code: holder.error_code,
                class_name: holder.class_name,
                message: holder.message,
            },
            None => HazelcastError::Protocol("error message without error holders".to_string()),
        },
        Err(err) => err,
    }
}

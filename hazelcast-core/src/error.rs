//! Error types for Hazelcast operations.

use std::io;
use thiserror::Error;

/// The main error type for Hazelcast operations.
#[derive(Debug, Error)]
pub enum HazelcastError {
    /// A connection could not be established, or a message could not be handed
    /// to a connection. The request never left the client.
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection carrying an in-flight request was lost before a response arrived.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Malformed frame or message. Always fatal to the connection it was read from.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response arrived within the caller's deadline.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Authentication was rejected by, or is incompatible with, the target member.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// No candidate cluster could be reached within the configured bounds.
    #[error("{0}")]
    UnableToConnect(String),

    /// The client is disconnected and configured not to wait for reconnection.
    #[error("client offline: {0}")]
    ClientOffline(String),

    /// The client has been shut down.
    #[error("client not active: {0}")]
    ClientNotActive(String),

    /// An error reported by a cluster member in reply to a request.
    #[error("server error {error_code} ({class_name}): {}", .message.as_deref().unwrap_or("<no message>"))]
    Server {
        /// Protocol error code.
        error_code: i32,
        /// Class name of the server-side exception.
        class_name: String,
        /// Optional server-provided message.
        message: Option<String>,
    },

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HazelcastError {
    /// Returns true if the request this error belongs to was never sent, so
    /// retrying it on another connection cannot execute it twice.
    pub fn is_retryable_before_send(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns true if the transport under an in-flight request went away.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::Io(_))
    }

    /// Returns true for authentication failures.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Returns true if the error leaves the receiving connection unusable.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Io(_))
    }
}

/// A specialized `Result` type for Hazelcast operations.
pub type Result<T> = std::result::Result<T, HazelcastError>;

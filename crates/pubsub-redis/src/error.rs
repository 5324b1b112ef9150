//! Error types for the Redis client.

use std::io;
use std::time::Duration;

use proven_pubsub::BrokerError;
use thiserror::Error;

/// Result type alias for Redis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to Redis.
#[derive(Debug, Error)]
pub enum Error {
    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// A broker option had the wrong type.
    #[error("invalid broker option `{name}`: expected {expected}")]
    InvalidOption {
        /// The option key.
        name: String,
        /// What the option should have been.
        expected: &'static str,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A subscription was requested without any channel or pattern.
    #[error("nothing to subscribe to")]
    NoTopics,

    /// Malformed RESP data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server replied with an error.
    #[error("server error: {0}")]
    Server(String),

    /// Connecting took too long.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// The server replied with something the command does not produce.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        /// The command that was sent.
        command: &'static str,
        /// The reply, debug-formatted.
        reply: String,
    },
}

impl BrokerError for Error {}

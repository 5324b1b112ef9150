use proven_pubsub::{BrokerError, Endpoint};
use thiserror::Error;

/// An error that can occur when working with the in-memory broker.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A broker is already registered at the endpoint.
    #[error("a broker is already running at {0}")]
    AlreadyRunning(Endpoint),

    /// The broker went away.
    #[error("broker connection closed")]
    ConnectionClosed,

    /// No broker is registered at the endpoint.
    #[error("connection refused - no broker running at {0}")]
    ConnectionRefused(Endpoint),

    /// A pattern could not be compiled.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A subscription was requested without any channel or pattern.
    #[error("nothing to subscribe to")]
    NoTopics,
}

impl BrokerError for Error {}

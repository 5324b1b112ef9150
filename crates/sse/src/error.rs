use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by fallible transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for SSE operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by an [`SseStream`](crate::SseStream).
#[derive(Debug, Error)]
pub enum Error {
    /// The broker connection could not be established or was lost.
    #[error("broker connection failed: {0}")]
    BrokerConnection(String),

    /// The construction options were rejected.
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),

    /// Tearing the subscription down failed. The stream still closes.
    #[error("teardown failed: {0}")]
    Teardown(String),

    /// A transform failed. The message was dropped.
    #[error("transform failed for message on `{channel}`: {fault}")]
    Transform {
        /// Channel the dropped message arrived on.
        channel: String,
        /// What went wrong.
        #[source]
        fault: TransformFault,
    },
}

/// Invalid construction options.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Broker options were not a key-value mapping.
    #[error("option `ioredis` must be an Object")]
    BrokerOptions,

    /// Channels were missing, empty, or of the wrong type.
    #[error("option `channels` is required and must be an Array or a String")]
    Channels,

    /// A supplementary option had the wrong type or range.
    #[error("option `{name}` must be {expected}")]
    InvalidOption {
        /// The option key.
        name: &'static str,
        /// What the option should have been.
        expected: &'static str,
    },

    /// The retry interval was not a positive number.
    #[error("option `sse.retry` must be a Number greater than 0")]
    RetryInterval,

    /// The transform was not callable.
    #[error("option `transform` must be a function")]
    Transform,
}

/// Ways a transform can fail to produce a payload.
#[derive(Debug, Error)]
pub enum TransformFault {
    /// The completion handle was dropped without completing.
    #[error("transform completion handle dropped without completing")]
    Abandoned,

    /// The transform returned an error.
    #[error("transform returned an error: {0}")]
    Failed(#[source] BoxError),

    /// The transform panicked.
    #[error("transform panicked: {0}")]
    Panicked(String),

    /// The transform did not complete in time.
    #[error("transform timed out after {0:?}")]
    TimedOut(Duration),
}

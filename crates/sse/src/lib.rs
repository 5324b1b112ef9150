//! Streams publish/subscribe channels as server-sent events.
//!
//! An [`SseStream`] subscribes to one or more channels (or glob patterns)
//! through any [`proven_pubsub::Connector`], optionally rewrites each payload
//! with a [`Transform`], and yields encoded frames in arrival order:
//!
//! ```text
//! retry: 5000
//! event: updates
//! data: payload
//!
//! ```
//!
//! The `event:` line is only written when channels are emitted as events.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod stream;
mod transform;

/// Frames and their wire encoding.
pub mod frame;

pub use config::{
    Channels, Config, DEFAULT_BUFFER, DEFAULT_HOST, DEFAULT_MAX_PENDING, DEFAULT_PORT,
    DEFAULT_RETRY_INTERVAL_MS, DEFAULT_TRANSFORM_TIMEOUT, Options,
};
pub use error::{BoxError, ConfigError, Error, Result, TransformFault};
pub use frame::Frame;
pub use stream::{SseHandle, SseStream, State, StreamEvent};
pub use transform::{Completion, Transform, TransformResult};

//! Abstract interface for publish/subscribe message brokers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Connections are exclusively owned links to a broker.
pub mod connection;

/// Connectors open connections to a broker endpoint.
pub mod connector;

/// Endpoints identify where a broker can be reached.
pub mod endpoint;

/// Messages are delivered to subscriptions.
pub mod message;

/// Subscriptions receive messages published to their topics.
pub mod subscription;

/// Topics describe what a subscription listens to.
pub mod topics;

pub use connection::Connection;
pub use connector::Connector;
pub use endpoint::Endpoint;
pub use message::Message;
pub use subscription::Subscription;
pub use topics::Topics;

use std::error::Error;

/// Opaque key-value options handed through to a broker client.
pub type BrokerOptions = serde_json::Map<String, serde_json::Value>;

/// Marker trait for broker errors
pub trait BrokerError: Error + Send + Sync + 'static {}

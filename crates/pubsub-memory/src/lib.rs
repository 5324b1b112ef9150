//! In-memory implementation of the pubsub crate.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

/// Brokers route published messages to matching subscriptions.
pub mod broker;

/// Connections publish or become subscriptions.
pub mod connection;

/// Subscriptions receive messages from a broker.
pub mod subscription;

pub use broker::{MemoryBroker, SUBSCRIBER_CAPACITY};
pub use connection::MemoryConnection;
pub use error::Error;
pub use subscription::MemorySubscription;

use async_trait::async_trait;
use proven_pubsub::{BrokerOptions, Connector, Endpoint};
use tracing::debug;

/// Opens connections to brokers started with [`MemoryBroker::start`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryConnector;

impl MemoryConnector {
    /// Creates a new `MemoryConnector`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Error = Error;
    type Connection = MemoryConnection;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: Option<&BrokerOptions>,
    ) -> Result<MemoryConnection, Error> {
        let broker =
            MemoryBroker::lookup(endpoint).ok_or_else(|| Error::ConnectionRefused(endpoint.clone()))?;

        if let Some(options) = options {
            debug!("Memory broker ignores {} broker options", options.len());
        }

        debug!("Connected to memory broker at {}", endpoint);

        Ok(MemoryConnection::new(broker))
    }
}

use crate::BrokerError;
use crate::subscription::Subscription;
use crate::topics::Topics;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// A trait representing a live connection to a broker.
///
/// A connection either publishes or is turned into a subscription; once
/// subscribed it belongs to that subscription until the subscription is closed.
#[async_trait]
pub trait Connection
where
    Self: Debug + Send + Sized + 'static,
{
    /// The error type for the connection.
    type Error: BrokerError;

    /// The subscription type produced by `subscribe`.
    type Subscription: Subscription<Error = Self::Error>;

    /// Publishes `payload` to `channel`, returning the number of deliveries.
    async fn publish(&mut self, channel: &str, payload: Bytes) -> Result<u64, Self::Error>;

    /// Subscribes to `topics`.
    ///
    /// Resolves only once the broker has confirmed every channel or pattern.
    async fn subscribe(self, topics: Topics) -> Result<Self::Subscription, Self::Error>;

    /// Closes the connection.
    async fn close(self) -> Result<(), Self::Error>;
}

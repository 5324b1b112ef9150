use crate::BrokerError;
use crate::message::Message;
use crate::topics::Topics;

use std::fmt::Debug;

use async_trait::async_trait;

/// A trait representing a confirmed subscription.
#[async_trait]
pub trait Subscription
where
    Self: Debug + Send + Sized + 'static,
{
    /// The error type for the subscription.
    type Error: BrokerError;

    /// The topics this subscription was confirmed for.
    fn topics(&self) -> &Topics;

    /// Waits for the next message.
    ///
    /// Returns `None` once the underlying connection has gone away. Must be
    /// cancel-safe: dropping the future before it resolves loses no message.
    async fn next_message(&mut self) -> Option<Result<Message, Self::Error>>;

    /// Unsubscribes and tears the connection down.
    ///
    /// Resolves once the broker connection has fully closed.
    async fn close(self) -> Result<(), Self::Error>;
}

use crate::broker::MemoryBroker;
use crate::error::Error;

use async_trait::async_trait;
use proven_pubsub::{Message, Subscription, Topics};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A confirmed subscription on an in-memory broker.
///
/// Dropping the subscription unregisters it from the broker.
#[derive(Debug)]
pub struct MemorySubscription {
    id: Uuid,
    broker: MemoryBroker,
    topics: Topics,
    receiver: mpsc::Receiver<Message>,
}

impl MemorySubscription {
    pub(crate) fn new(
        id: Uuid,
        broker: MemoryBroker,
        topics: Topics,
        receiver: mpsc::Receiver<Message>,
    ) -> Self {
        Self {
            id,
            broker,
            topics,
            receiver,
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    type Error = Error;

    fn topics(&self) -> &Topics {
        &self.topics
    }

    async fn next_message(&mut self) -> Option<Result<Message, Error>> {
        self.receiver.recv().await.map(Ok)
    }

    async fn close(self) -> Result<(), Error> {
        debug!("Closing memory subscription {}", self.id);

        // Unregistration happens on drop.
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.broker.unregister(&self.id);
    }
}

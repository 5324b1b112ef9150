use crate::broker::MemoryBroker;
use crate::error::Error;
use crate::subscription::MemorySubscription;

use async_trait::async_trait;
use bytes::Bytes;
use proven_pubsub::{Connection, Topics};
use tracing::debug;
use uuid::Uuid;

/// A connection to an in-memory broker.
#[derive(Clone, Debug)]
pub struct MemoryConnection {
    id: Uuid,
    broker: MemoryBroker,
}

impl MemoryConnection {
    pub(crate) fn new(broker: MemoryBroker) -> Self {
        Self {
            id: Uuid::new_v4(),
            broker,
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Error = Error;
    type Subscription = MemorySubscription;

    async fn publish(&mut self, channel: &str, payload: Bytes) -> Result<u64, Error> {
        self.broker.publish(channel, payload)
    }

    async fn subscribe(self, topics: Topics) -> Result<MemorySubscription, Error> {
        let (id, receiver) = self.broker.register(&topics)?;

        debug!(
            "Memory connection {} subscribed to {:?} as {}",
            self.id,
            topics.names(),
            id
        );

        Ok(MemorySubscription::new(id, self.broker, topics, receiver))
    }

    async fn close(self) -> Result<(), Error> {
        debug!("Closing memory connection {}", self.id);

        Ok(())
    }
}

use crate::codec::{Command, RespValue};
use crate::connection::Transport;
use crate::error::{Error, Result};

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use proven_pubsub::{Endpoint, Message, Subscription, Topics};
use tracing::{debug, info};

/// A reply received while in the subscribed state.
#[derive(Debug)]
pub(crate) enum Push {
    /// `subscribe`, `psubscribe`, `unsubscribe` or `punsubscribe` acknowledgement.
    Confirmation { kind: Bytes, name: String },
    Error(String),
    Message(Message),
    Other(String),
}

impl From<RespValue> for Push {
    fn from(value: RespValue) -> Self {
        let items = match value {
            RespValue::Error(message) => return Self::Error(message),
            RespValue::Array(Some(items)) => items,
            other => return Self::Other(format!("{other:?}")),
        };

        match items.as_slice() {
            [
                RespValue::Bulk(Some(kind)),
                RespValue::Bulk(Some(channel)),
                RespValue::Bulk(Some(payload)),
            ] if kind.as_ref() == b"message" => {
                Self::Message(Message::new(lossy(channel), payload.clone()))
            }
            [
                RespValue::Bulk(Some(kind)),
                RespValue::Bulk(Some(pattern)),
                RespValue::Bulk(Some(channel)),
                RespValue::Bulk(Some(payload)),
            ] if kind.as_ref() == b"pmessage" => Self::Message(Message::matched(
                lossy(pattern),
                lossy(channel),
                payload.clone(),
            )),
            [
                RespValue::Bulk(Some(kind)),
                name,
                RespValue::Integer(_),
            ] => Self::Confirmation {
                kind: kind.clone(),
                name: name.clone().into_bytes().map(|name| lossy(&name)).unwrap_or_default(),
            },
            _ => Self::Other(format!("{items:?}")),
        }
    }
}

fn lossy(bytes: &Bytes) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// A Redis connection in the subscribed state.
#[derive(Debug)]
pub struct RedisSubscription {
    endpoint: Endpoint,
    topics: Topics,
    framed: Transport,
    pending: VecDeque<Message>,
}

impl RedisSubscription {
    pub(crate) const fn new(
        endpoint: Endpoint,
        topics: Topics,
        framed: Transport,
        pending: VecDeque<Message>,
    ) -> Self {
        Self {
            endpoint,
            topics,
            framed,
            pending,
        }
    }
}

#[async_trait]
impl Subscription for RedisSubscription {
    type Error = Error;

    fn topics(&self) -> &Topics {
        &self.topics
    }

    async fn next_message(&mut self) -> Option<Result<Message>> {
        if let Some(message) = self.pending.pop_front() {
            return Some(Ok(message));
        }

        loop {
            match self.framed.next().await? {
                Ok(reply) => match Push::from(reply) {
                    Push::Message(message) => return Some(Ok(message)),
                    Push::Error(message) => return Some(Err(Error::Server(message))),
                    other => debug!("Ignoring push from {}: {:?}", self.endpoint, other),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(mut self) -> Result<()> {
        let unsubscribe = if self.topics.is_pattern() {
            Command::new("PUNSUBSCRIBE")
        } else {
            Command::new("UNSUBSCRIBE")
        };

        self.framed.feed(unsubscribe).await?;
        self.framed.feed(Command::new("QUIT")).await?;
        self.framed.flush().await?;

        // The server hangs up after replying to QUIT.
        while let Some(reply) = self.framed.next().await {
            debug!("Reply while unsubscribing: {:?}", reply?);
        }

        info!("Unsubscribed from {:?} on {}", self.topics.names(), self.endpoint);

        Ok(())
    }
}

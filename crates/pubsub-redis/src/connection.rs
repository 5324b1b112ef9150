//! Connection handshake and request/reply handling.

use crate::codec::{Command, RespCodec, RespValue};
use crate::error::{Error, Result};
use crate::options::RedisOptions;
use crate::subscription::{Push, RedisSubscription};

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use proven_pubsub::{Connection, Endpoint, Topics};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Framed transport shared by connections and subscriptions.
pub(crate) type Transport = Framed<TcpStream, RespCodec>;

/// A connection to a Redis server.
#[derive(Debug)]
pub struct RedisConnection {
    endpoint: Endpoint,
    framed: Transport,
}

impl RedisConnection {
    /// Connects to `endpoint` and performs the handshake described by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable within the connect timeout
    /// or rejects any handshake command.
    pub async fn open(endpoint: &Endpoint, options: &RedisOptions) -> Result<Self> {
        let stream = timeout(
            options.connect_timeout,
            TcpStream::connect((endpoint.host(), endpoint.port())),
        )
        .await
        .map_err(|_| Error::Timeout(options.connect_timeout))??;
        stream.set_nodelay(true)?;

        let mut connection = Self {
            endpoint: endpoint.clone(),
            framed: Framed::new(stream, RespCodec::new()),
        };
        connection.handshake(options).await?;

        info!("Connected to redis at {}", endpoint);

        Ok(connection)
    }

    /// The endpoint this connection was opened against.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn handshake(&mut self, options: &RedisOptions) -> Result<()> {
        match (&options.username, &options.password) {
            (Some(username), Some(password)) => {
                self.expect_ok(
                    Command::new("AUTH")
                        .arg(username.clone())
                        .arg(password.clone()),
                )
                .await?;
            }
            (None, Some(password)) => {
                self.expect_ok(Command::new("AUTH").arg(password.clone()))
                    .await?;
            }
            (Some(_), None) => warn!("Ignoring redis username without a password"),
            (None, None) => {}
        }

        if let Some(db) = options.db {
            self.expect_ok(Command::new("SELECT").arg(db.to_string()))
                .await?;
        }

        if let Some(name) = &options.connection_name {
            self.expect_ok(Command::new("CLIENT").arg("SETNAME").arg(name.clone()))
                .await?;
        }

        Ok(())
    }

    async fn request(&mut self, command: Command) -> Result<RespValue> {
        debug!("Sending {} to {}", command.name(), self.endpoint);

        self.framed.send(command).await?;

        match self.framed.next().await {
            Some(Ok(RespValue::Error(message))) => Err(Error::Server(message)),
            Some(reply) => reply,
            None => Err(Error::ConnectionClosed),
        }
    }

    async fn expect_ok(&mut self, command: Command) -> Result<()> {
        let name = command.name();
        let reply = self.request(command).await?;

        if reply.is_ok() {
            Ok(())
        } else {
            Err(Error::UnexpectedReply {
                command: name,
                reply: format!("{reply:?}"),
            })
        }
    }
}

#[async_trait]
impl Connection for RedisConnection {
    type Error = Error;
    type Subscription = RedisSubscription;

    async fn publish(&mut self, channel: &str, payload: Bytes) -> Result<u64> {
        let reply = self
            .request(Command::new("PUBLISH").arg(channel.to_string()).arg(payload))
            .await?;

        match reply {
            RespValue::Integer(receivers) => Ok(u64::try_from(receivers).unwrap_or_default()),
            reply => Err(Error::UnexpectedReply {
                command: "PUBLISH",
                reply: format!("{reply:?}"),
            }),
        }
    }

    async fn subscribe(mut self, topics: Topics) -> Result<RedisSubscription> {
        if topics.is_empty() {
            return Err(Error::NoTopics);
        }

        let (name, kind) = if topics.is_pattern() {
            ("PSUBSCRIBE", &b"psubscribe"[..])
        } else {
            ("SUBSCRIBE", &b"subscribe"[..])
        };

        self.framed
            .send(Command::new(name).args(topics.names().iter().cloned()))
            .await?;

        // The server confirms every argument, duplicates included. Anything
        // published in between is kept for the subscription.
        let mut pending = VecDeque::new();
        let mut confirmed = 0;
        while confirmed < topics.len() {
            let reply = self.framed.next().await.ok_or(Error::ConnectionClosed)??;

            match Push::from(reply) {
                Push::Confirmation {
                    kind: confirmed_kind,
                    name: topic,
                } if confirmed_kind == kind => {
                    debug!("Redis confirmed {} {}", name, topic);
                    confirmed += 1;
                }
                Push::Message(message) => pending.push_back(message),
                Push::Error(message) => return Err(Error::Server(message)),
                other => {
                    return Err(Error::UnexpectedReply {
                        command: name,
                        reply: format!("{other:?}"),
                    });
                }
            }
        }

        info!(
            "Subscribed to {:?} on {} ({})",
            topics.names(),
            self.endpoint,
            name
        );

        Ok(RedisSubscription::new(
            self.endpoint,
            topics,
            self.framed,
            pending,
        ))
    }

    async fn close(mut self) -> Result<()> {
        self.framed.send(Command::new("QUIT")).await?;

        while let Some(reply) = self.framed.next().await {
            debug!("Reply while closing: {:?}", reply?);
        }

        debug!("Redis connection to {} closed", self.endpoint);

        Ok(())
    }
}

//! Redis implementation of the pubsub crate.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod codec;
mod connection;
mod error;
mod options;
mod subscription;

pub use codec::{Command, MAX_BULK_SIZE, RespCodec, RespValue};
pub use connection::RedisConnection;
pub use error::{Error, Result};
pub use options::{DEFAULT_CONNECT_TIMEOUT, RedisOptions};
pub use subscription::RedisSubscription;

use async_trait::async_trait;
use proven_pubsub::{BrokerOptions, Connector, Endpoint};

/// Opens connections to Redis servers over TCP.
#[derive(Clone, Debug, Default)]
pub struct RedisConnector;

impl RedisConnector {
    /// Creates a new `RedisConnector`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Error = Error;
    type Connection = RedisConnection;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: Option<&BrokerOptions>,
    ) -> Result<RedisConnection> {
        let options = options
            .map(RedisOptions::from_map)
            .transpose()?
            .unwrap_or_default();

        RedisConnection::open(endpoint, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use bytes::Bytes;
    use futures::StreamExt;
    use proven_pubsub::{Connection, Message, Subscription, Topics};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::time::{Duration, timeout};
    use tokio_util::codec::FramedRead;

    /// Scripted stand-in for a Redis server, one client at a time.
    struct FakeServer {
        reader: FramedRead<OwnedReadHalf, RespCodec>,
        writer: OwnedWriteHalf,
    }

    impl FakeServer {
        async fn bind() -> (TcpListener, Endpoint) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            (listener, Endpoint::new("127.0.0.1", port))
        }

        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, writer) = stream.into_split();
            Self {
                reader: FramedRead::new(reader, RespCodec::new()),
                writer,
            }
        }

        async fn expect(&mut self, args: &[&str]) {
            let command = timeout(Duration::from_secs(1), self.reader.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let expected = args
                .iter()
                .map(|arg| RespValue::Bulk(Some(Bytes::copy_from_slice(arg.as_bytes()))))
                .collect();
            assert_eq!(command, RespValue::Array(Some(expected)));
        }

        async fn reply(&mut self, raw: &str) {
            self.writer.write_all(raw.as_bytes()).await.unwrap();
        }

        async fn push(&mut self, items: &[&str]) {
            let mut raw = format!("*{}\r\n", items.len());
            for item in items {
                raw.push_str(&format!("${}\r\n{}\r\n", item.len(), item));
            }
            self.reply(&raw).await;
        }
    }

    fn broker_options(value: serde_json::Value) -> BrokerOptions {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_handshake_and_publish() {
        let _ = tracing_subscriber::fmt::try_init();

        let (listener, endpoint) = FakeServer::bind().await;
        let server = tokio::spawn(async move {
            let mut server = FakeServer::accept(&listener).await;
            server.expect(&["AUTH", "reader", "secret"]).await;
            server.reply("+OK\r\n").await;
            server.expect(&["SELECT", "2"]).await;
            server.reply("+OK\r\n").await;
            server.expect(&["CLIENT", "SETNAME", "sse"]).await;
            server.reply("+OK\r\n").await;
            server.expect(&["PUBLISH", "test", "hello"]).await;
            server.reply(":3\r\n").await;
            server.expect(&["QUIT"]).await;
            server.reply("+OK\r\n").await;
        });

        let options = broker_options(json!({
            "username": "reader",
            "password": "secret",
            "db": 2,
            "connectionName": "sse",
        }));
        let mut connection = RedisConnector::new()
            .connect(&endpoint, Some(&options))
            .await
            .unwrap();

        assert_eq!(
            connection.publish("test", Bytes::from("hello")).await.unwrap(),
            3
        );

        connection.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let (listener, endpoint) = FakeServer::bind().await;
        let server = tokio::spawn(async move {
            let mut server = FakeServer::accept(&listener).await;
            server.expect(&["AUTH", "wrong"]).await;
            server
                .reply("-WRONGPASS invalid username-password pair\r\n")
                .await;
        });

        let options = broker_options(json!({ "password": "wrong" }));

        assert_matches!(
            RedisConnector::new().connect(&endpoint, Some(&options)).await,
            Err(Error::Server(message)) if message.starts_with("WRONGPASS")
        );

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_option_rejected_before_connecting() {
        let endpoint = Endpoint::new("127.0.0.1", 1);
        let options = broker_options(json!({ "db": "zero" }));

        assert_matches!(
            RedisConnector::new().connect(&endpoint, Some(&options)).await,
            Err(Error::InvalidOption { .. })
        );
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let (listener, endpoint) = FakeServer::bind().await;
        drop(listener);

        assert_matches!(
            RedisConnector::new().connect(&endpoint, None).await,
            Err(Error::Io(_))
        );
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let _ = tracing_subscriber::fmt::try_init();

        let (listener, endpoint) = FakeServer::bind().await;
        let server = tokio::spawn(async move {
            let mut server = FakeServer::accept(&listener).await;
            server.expect(&["SUBSCRIBE", "first", "second"]).await;
            server.reply("*3\r\n$9\r\nsubscribe\r\n$5\r\nfirst\r\n:1\r\n").await;
            server.push(&["message", "first", "early"]).await;
            server.reply("*3\r\n$9\r\nsubscribe\r\n$6\r\nsecond\r\n:2\r\n").await;
            server.push(&["message", "second", "line1\nline2"]).await;
            server.expect(&["UNSUBSCRIBE"]).await;
            server.reply("*3\r\n$11\r\nunsubscribe\r\n$5\r\nfirst\r\n:1\r\n").await;
            server.reply("*3\r\n$11\r\nunsubscribe\r\n$6\r\nsecond\r\n:0\r\n").await;
            server.expect(&["QUIT"]).await;
            server.reply("+OK\r\n").await;
        });

        let mut subscription = RedisConnector::new()
            .connect(&endpoint, None)
            .await
            .unwrap()
            .subscribe(Topics::Channels(vec![
                "first".to_string(),
                "second".to_string(),
            ]))
            .await
            .unwrap();

        assert_eq!(
            subscription.next_message().await.unwrap().unwrap(),
            Message::new("first", "early")
        );
        assert_eq!(
            timeout(Duration::from_secs(1), subscription.next_message())
                .await
                .unwrap()
                .unwrap()
                .unwrap(),
            Message::new("second", "line1\nline2")
        );

        subscription.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_pattern_subscription() {
        let (listener, endpoint) = FakeServer::bind().await;
        let server = tokio::spawn(async move {
            let mut server = FakeServer::accept(&listener).await;
            server.expect(&["PSUBSCRIBE", "test*"]).await;
            server.reply("*3\r\n$10\r\npsubscribe\r\n$5\r\ntest*\r\n:1\r\n").await;
            server.push(&["pmessage", "test*", "test-1", "hello"]).await;
            server.expect(&["PUNSUBSCRIBE"]).await;
            server.expect(&["QUIT"]).await;
            server.reply("+OK\r\n").await;
        });

        let mut subscription = RedisConnector::new()
            .connect(&endpoint, None)
            .await
            .unwrap()
            .subscribe(Topics::Patterns(vec!["test*".to_string()]))
            .await
            .unwrap();

        assert_eq!(
            timeout(Duration::from_secs(1), subscription.next_message())
                .await
                .unwrap()
                .unwrap()
                .unwrap(),
            Message::matched("test*", "test-1", "hello")
        );

        subscription.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_hangup_ends_subscription() {
        let (listener, endpoint) = FakeServer::bind().await;
        let server = tokio::spawn(async move {
            let mut server = FakeServer::accept(&listener).await;
            server.expect(&["SUBSCRIBE", "test"]).await;
            server.reply("*3\r\n$9\r\nsubscribe\r\n$4\r\ntest\r\n:1\r\n").await;
        });

        let mut subscription = RedisConnector::new()
            .connect(&endpoint, None)
            .await
            .unwrap()
            .subscribe(Topics::Channels(vec!["test".to_string()]))
            .await
            .unwrap();

        server.await.unwrap();

        assert!(
            timeout(Duration::from_secs(1), subscription.next_message())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_subscribe_rejected() {
        let (listener, endpoint) = FakeServer::bind().await;
        let server = tokio::spawn(async move {
            let mut server = FakeServer::accept(&listener).await;
            server.expect(&["SUBSCRIBE", "test"]).await;
            server.reply("-NOPERM no permissions\r\n").await;
        });

        let result = RedisConnector::new()
            .connect(&endpoint, None)
            .await
            .unwrap()
            .subscribe(Topics::Channels(vec!["test".to_string()]))
            .await;

        assert_matches!(result, Err(Error::Server(_)));
        server.await.unwrap();
    }
}

//! CLI binary that streams Redis pub/sub channels to stdout as server-sent events.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use proven_pubsub_redis::RedisConnector;
use proven_sse::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RETRY_INTERVAL_MS, Options, SseStream, StreamEvent,
};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed `--broker-option`
    #[error("invalid broker option `{0}`: expected key=value")]
    BrokerOption(String),

    /// Writing to stdout failed
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// Adapter construction error
    #[error(transparent)]
    Sse(#[from] proven_sse::Error),

    /// The stream ended because of an error
    #[error("stream failed: {0}")]
    Stream(Arc<proven_sse::Error>),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Channel (or pattern) to subscribe to; repeat or comma-separate for several
    #[arg(
        long = "channel",
        short = 'c',
        required = true,
        value_delimiter = ',',
        env = "PROVEN_SSE_CHANNELS"
    )]
    channels: Vec<String>,

    /// Subscribe to channels as glob patterns
    #[arg(long, env = "PROVEN_SSE_PATTERN")]
    pattern: bool,

    /// Name each event after the channel it arrived on
    #[arg(long, env = "PROVEN_SSE_EVENTS")]
    events: bool,

    /// Reconnection delay advertised to clients, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_INTERVAL_MS, env = "PROVEN_SSE_RETRY_MS")]
    retry_ms: u64,

    /// Redis host
    #[arg(long, default_value = DEFAULT_HOST, env = "PROVEN_SSE_HOST")]
    host: String,

    /// Redis port
    #[arg(long, default_value_t = DEFAULT_PORT, env = "PROVEN_SSE_PORT")]
    port: u16,

    /// Redis client option as key=value (e.g. password=secret, db=2); repeatable
    #[arg(long = "broker-option", value_parser = parse_broker_option)]
    broker_options: Vec<(String, Value)>,
}

impl Args {
    fn into_options(self) -> Options {
        let options = Options::new(self.channels)
            .with_pattern_mode(self.pattern)
            .with_channels_as_events(self.events)
            .with_retry_interval_ms(self.retry_ms)
            .with_host(self.host)
            .with_port(self.port);

        if self.broker_options.is_empty() {
            options
        } else {
            options.with_broker_options(Value::Object(self.broker_options.into_iter().collect()))
        }
    }
}

/// Splits `key=value`, reading the value as JSON when it parses (numbers,
/// booleans) and as a plain string otherwise.
fn parse_broker_option(option: &str) -> Result<(String, Value), Error> {
    let (key, value) = option
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| Error::BrokerOption(option.to_string()))?;

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

    Ok((key.to_string(), value))
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            _ => warn!("Signal handlers unavailable, falling back to ctrl-c"),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("Received interrupt signal");
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Frames go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut stream = SseStream::new(args.into_options(), RedisConnector::new())?;

    let handle = stream.handle();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutting down");
        handle.close().await;
    });

    let mut stdout = tokio::io::stdout();
    let mut failure = None;

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Ready => info!("Streaming {:?}", stream.config().channels()),
            StreamEvent::Frame(frame) => {
                stdout.write_all(&frame).await?;
                stdout.flush().await?;
            }
            StreamEvent::Error(e) => {
                error!("{}", e);
                if matches!(*e, proven_sse::Error::BrokerConnection(_)) {
                    failure = Some(e);
                }
            }
        }
    }

    failure.map_or(Ok(()), |e| Err(Error::Stream(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_broker_option() {
        assert_eq!(
            parse_broker_option("db=2").unwrap(),
            ("db".to_string(), json!(2))
        );
        assert_eq!(
            parse_broker_option("password=s3cr=t").unwrap(),
            ("password".to_string(), json!("s3cr=t"))
        );
        assert!(parse_broker_option("password").is_err());
        assert!(parse_broker_option("=value").is_err());
    }

    #[test]
    fn test_args_into_options() {
        let options = Args::try_parse_from([
            "proven-sse",
            "--channel",
            "news,alerts",
            "-c",
            "audit",
            "--events",
            "--retry-ms",
            "1000",
            "--port",
            "6380",
            "--broker-option",
            "db=1",
        ])
        .unwrap()
        .into_options();

        assert_eq!(options.channels.as_slice(), ["news", "alerts", "audit"]);
        assert!(!options.pattern_mode);
        assert!(options.channels_as_events);
        assert_eq!(options.retry_interval_ms, 1000);
        assert_eq!(options.host, DEFAULT_HOST);
        assert_eq!(options.port, 6380);
        assert_eq!(options.broker_options, Some(json!({ "db": 1 })));
    }

    #[test]
    fn test_numeric_password_reaches_redis_options() {
        let options = Args::try_parse_from([
            "proven-sse",
            "-c",
            "news",
            "--broker-option",
            "password=123456",
            "--broker-option",
            "db=3",
        ])
        .unwrap()
        .into_options();

        let Some(Value::Object(map)) = options.broker_options else {
            panic!("broker options missing");
        };
        let redis = proven_pubsub_redis::RedisOptions::from_map(&map).unwrap();

        assert_eq!(redis.password.as_deref(), Some("123456"));
        assert_eq!(redis.db, Some(3));
    }

    #[test]
    fn test_channel_required() {
        assert!(Args::try_parse_from(["proven-sse"]).is_err());
    }
}

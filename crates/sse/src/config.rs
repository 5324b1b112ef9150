use crate::error::ConfigError;
use crate::transform::Transform;

use std::time::Duration;

use proven_pubsub::{BrokerOptions, Endpoint, Topics};
use serde_json::Value;

/// Default broker host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default broker port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default client reconnection delay advertised in the retry frame.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5000;

/// Default time an asynchronous transform may take.
pub const DEFAULT_TRANSFORM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of messages allowed inside the transform pipeline.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default output buffer capacity, in events.
pub const DEFAULT_BUFFER: usize = 256;

/// One or more channel names, or glob patterns in pattern mode.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Channels(Vec<String>);

impl Channels {
    /// The entries, in order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Consumes the list.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Channels {
    fn from(channel: &str) -> Self {
        Self(vec![channel.to_string()])
    }
}

impl From<String> for Channels {
    fn from(channel: String) -> Self {
        Self(vec![channel])
    }
}

impl From<Vec<String>> for Channels {
    fn from(channels: Vec<String>) -> Self {
        Self(channels)
    }
}

impl From<Vec<&str>> for Channels {
    fn from(channels: Vec<&str>) -> Self {
        Self(channels.into_iter().map(ToString::to_string).collect())
    }
}

impl From<&[&str]> for Channels {
    fn from(channels: &[&str]) -> Self {
        Self(channels.iter().map(ToString::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Channels {
    fn from(channels: [&str; N]) -> Self {
        Self(channels.iter().map(ToString::to_string).collect())
    }
}

/// Construction options, validated into a [`Config`].
#[derive(Clone, Debug)]
pub struct Options {
    /// Channels, or patterns when `pattern_mode` is set. Required.
    pub channels: Channels,

    /// Subscribe to `channels` as glob patterns.
    pub pattern_mode: bool,

    /// Name each event after the channel it arrived on.
    pub channels_as_events: bool,

    /// Value of the retry frame.
    pub retry_interval_ms: u64,

    /// Broker host.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Options passed through to the broker client. Must be an object.
    pub broker_options: Option<Value>,

    /// Payload rewrite applied before framing.
    pub transform: Option<Transform>,

    /// Limit on each asynchronous transform. `None` waits forever.
    pub transform_timeout: Option<Duration>,

    /// Messages allowed inside the transform pipeline before broker reads pause.
    pub max_pending: usize,

    /// Output buffer capacity, in events.
    pub buffer: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            channels: Channels::default(),
            pattern_mode: false,
            channels_as_events: false,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            broker_options: None,
            transform: None,
            transform_timeout: Some(DEFAULT_TRANSFORM_TIMEOUT),
            max_pending: DEFAULT_MAX_PENDING,
            buffer: DEFAULT_BUFFER,
        }
    }
}

impl Options {
    /// Options for `channels` with every other setting at its default.
    pub fn new<C>(channels: C) -> Self
    where
        C: Into<Channels>,
    {
        Self {
            channels: channels.into(),
            ..Self::default()
        }
    }

    /// Sets pattern mode.
    #[must_use]
    pub const fn with_pattern_mode(mut self, pattern_mode: bool) -> Self {
        self.pattern_mode = pattern_mode;
        self
    }

    /// Sets whether channels are emitted as event names.
    #[must_use]
    pub const fn with_channels_as_events(mut self, channels_as_events: bool) -> Self {
        self.channels_as_events = channels_as_events;
        self
    }

    /// Sets the retry interval.
    #[must_use]
    pub const fn with_retry_interval_ms(mut self, retry_interval_ms: u64) -> Self {
        self.retry_interval_ms = retry_interval_ms;
        self
    }

    /// Sets the broker host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the broker port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets pass-through broker options.
    #[must_use]
    pub fn with_broker_options(mut self, broker_options: Value) -> Self {
        self.broker_options = Some(broker_options);
        self
    }

    /// Sets the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Sets the asynchronous transform timeout.
    #[must_use]
    pub const fn with_transform_timeout(mut self, transform_timeout: Option<Duration>) -> Self {
        self.transform_timeout = transform_timeout;
        self
    }

    /// Sets how many messages may be inside the transform pipeline.
    #[must_use]
    pub const fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the output buffer capacity.
    #[must_use]
    pub const fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Reads options from a dynamic value, e.g. a parsed config file.
    ///
    /// Keys: `channels`, `patternSubscribe`, `channelsAsEvents`, `host`,
    /// `port`, `ioredis`, `sse.retry`, `transform`, plus `transformTimeout`
    /// (milliseconds, `null` to disable), `maxPending` and `buffer`. Unknown
    /// keys are ignored. A dynamic value can never hold a callable, so any
    /// `transform` other than `null` is rejected.
    ///
    /// # Errors
    ///
    /// Returns the first option found to be of the wrong type. Range checks
    /// happen in [`Config::try_from`].
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let object = value.as_object().ok_or(ConfigError::Channels)?;
        let mut options = Self::default();

        options.channels = match object.get("channels") {
            Some(Value::String(channel)) => Channels::from(channel.clone()),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| entry.as_str().map(ToString::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Channels::from)
                .ok_or(ConfigError::Channels)?,
            _ => return Err(ConfigError::Channels),
        };

        match object.get("ioredis") {
            None | Some(Value::Null) => {}
            Some(broker_options) => options.broker_options = Some(broker_options.clone()),
        }

        if !matches!(object.get("transform"), None | Some(Value::Null)) {
            return Err(ConfigError::Transform);
        }

        match object.get("sse") {
            None | Some(Value::Null) => {}
            Some(Value::Object(sse)) => {
                if let Some(retry) = sse.get("retry") {
                    options.retry_interval_ms = retry
                        .as_u64()
                        .filter(|retry| *retry > 0)
                        .ok_or(ConfigError::RetryInterval)?;
                }
            }
            Some(_) => {
                return Err(ConfigError::InvalidOption {
                    name: "sse",
                    expected: "an Object",
                });
            }
        }

        if let Some(pattern_mode) = object.get("patternSubscribe") {
            options.pattern_mode = boolean("patternSubscribe", pattern_mode)?;
        }
        if let Some(channels_as_events) = object.get("channelsAsEvents") {
            options.channels_as_events = boolean("channelsAsEvents", channels_as_events)?;
        }
        if let Some(host) = object.get("host") {
            options.host = host
                .as_str()
                .map(ToString::to_string)
                .ok_or(ConfigError::InvalidOption {
                    name: "host",
                    expected: "a String",
                })?;
        }
        if let Some(port) = object.get("port") {
            options.port = port
                .as_u64()
                .and_then(|port| u16::try_from(port).ok())
                .ok_or(ConfigError::InvalidOption {
                    name: "port",
                    expected: "a port Number",
                })?;
        }
        match object.get("transformTimeout") {
            None => {}
            Some(Value::Null) => options.transform_timeout = None,
            Some(timeout) => {
                let timeout_ms = timeout.as_u64().ok_or(ConfigError::InvalidOption {
                    name: "transformTimeout",
                    expected: "a non-negative integer or null",
                })?;
                options.transform_timeout = Some(Duration::from_millis(timeout_ms));
            }
        }
        if let Some(max_pending) = object.get("maxPending") {
            options.max_pending = count("maxPending", max_pending)?;
        }
        if let Some(buffer) = object.get("buffer") {
            options.buffer = count("buffer", buffer)?;
        }

        Ok(options)
    }
}

fn boolean(name: &'static str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or(ConfigError::InvalidOption {
        name,
        expected: "a Boolean",
    })
}

fn count(name: &'static str, value: &Value) -> Result<usize, ConfigError> {
    value
        .as_u64()
        .and_then(|count| usize::try_from(count).ok())
        .ok_or(ConfigError::InvalidOption {
            name,
            expected: "a non-negative integer",
        })
}

/// Validated, immutable adapter configuration.
#[derive(Clone, Debug)]
pub struct Config {
    broker_options: Option<BrokerOptions>,
    buffer: usize,
    channels: Vec<String>,
    channels_as_events: bool,
    host: String,
    max_pending: usize,
    pattern_mode: bool,
    port: u16,
    retry_interval_ms: u64,
    transform: Option<Transform>,
    transform_timeout: Option<Duration>,
}

impl Config {
    /// Reads and validates options from a dynamic value.
    ///
    /// # Errors
    ///
    /// Returns an error if any option is missing, mistyped or out of range.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        Options::from_value(value)?.try_into()
    }

    /// Channel names or patterns, in subscription order.
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Whether `channels` are glob patterns.
    #[must_use]
    pub const fn pattern_mode(&self) -> bool {
        self.pattern_mode
    }

    /// Whether each message is preceded by an `event:` frame.
    #[must_use]
    pub const fn channels_as_events(&self) -> bool {
        self.channels_as_events
    }

    /// Value of the retry frame.
    #[must_use]
    pub const fn retry_interval_ms(&self) -> u64 {
        self.retry_interval_ms
    }

    /// Broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Broker port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Broker address.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Pass-through broker options.
    #[must_use]
    pub const fn broker_options(&self) -> Option<&BrokerOptions> {
        self.broker_options.as_ref()
    }

    /// Payload transform.
    #[must_use]
    pub const fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    /// Limit on each asynchronous transform.
    #[must_use]
    pub const fn transform_timeout(&self) -> Option<Duration> {
        self.transform_timeout
    }

    /// Messages allowed inside the transform pipeline.
    #[must_use]
    pub const fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Output buffer capacity.
    #[must_use]
    pub const fn buffer(&self) -> usize {
        self.buffer
    }

    /// What to subscribe to.
    #[must_use]
    pub fn topics(&self) -> Topics {
        if self.pattern_mode {
            Topics::Patterns(self.channels.clone())
        } else {
            Topics::Channels(self.channels.clone())
        }
    }
}

impl TryFrom<Options> for Config {
    type Error = ConfigError;

    fn try_from(options: Options) -> Result<Self, ConfigError> {
        let channels = options.channels.into_vec();
        if channels.is_empty() || channels.iter().any(String::is_empty) {
            return Err(ConfigError::Channels);
        }

        let broker_options = match options.broker_options {
            None => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => return Err(ConfigError::BrokerOptions),
        };

        if options.retry_interval_ms == 0 {
            return Err(ConfigError::RetryInterval);
        }

        if options.max_pending == 0 {
            return Err(ConfigError::InvalidOption {
                name: "maxPending",
                expected: "a Number greater than 0",
            });
        }

        // Event name and data are reserved together.
        if options.buffer < 2 {
            return Err(ConfigError::InvalidOption {
                name: "buffer",
                expected: "a Number of at least 2",
            });
        }

        Ok(Self {
            broker_options,
            buffer: options.buffer,
            channels,
            channels_as_events: options.channels_as_events,
            host: options.host,
            max_pending: options.max_pending,
            pattern_mode: options.pattern_mode,
            port: options.port,
            retry_interval_ms: options.retry_interval_ms,
            transform: options.transform,
            transform_timeout: options.transform_timeout,
        })
    }
}

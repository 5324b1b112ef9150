use crate::error::{Error, Result};

use std::time::Duration;

use proven_pubsub::BrokerOptions;
use serde_json::Value;
use tracing::debug;

/// Default time allowed to establish the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings understood by the Redis client.
///
/// Parsed from pass-through broker options using the familiar key names
/// `username`, `password`, `db`, `connectionName` and `connectTimeout`
/// (milliseconds).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisOptions {
    /// Name reported via `CLIENT SETNAME`.
    pub connection_name: Option<String>,
    /// Time allowed to establish the TCP connection.
    pub connect_timeout: Duration,
    /// Logical database to `SELECT` after connecting.
    pub db: Option<u32>,
    /// Password for `AUTH`.
    pub password: Option<String>,
    /// Username for `AUTH` (requires a password).
    pub username: Option<String>,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            connection_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            db: None,
            password: None,
            username: None,
        }
    }
}

impl RedisOptions {
    /// Interprets pass-through broker options.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    /// Returns an error if a known key holds a value of the wrong type.
    pub fn from_map(map: &BrokerOptions) -> Result<Self> {
        let mut options = Self::default();

        for (key, value) in map {
            match key.as_str() {
                "connectionName" => options.connection_name = Some(string(key, value)?),
                "connectTimeout" => {
                    options.connect_timeout = Duration::from_millis(integer(key, value)?);
                }
                "db" => {
                    options.db = Some(u32::try_from(integer(key, value)?).map_err(|_| {
                        invalid(key, "a database index")
                    })?);
                }
                "password" => options.password = Some(string(key, value)?),
                "username" => options.username = Some(string(key, value)?),
                _ => debug!("Ignoring unsupported broker option {}", key),
            }
        }

        Ok(options)
    }
}

fn invalid(key: &str, expected: &'static str) -> Error {
    Error::InvalidOption {
        name: key.to_string(),
        expected,
    }
}

// Numbers and booleans are accepted as their textual form, e.g. `password: 1234`.
fn string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(key, "a string")),
    }
}

fn integer(key: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| invalid(key, "a non-negative integer"))
}

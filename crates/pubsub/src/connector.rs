use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::{BrokerError, BrokerOptions};

use std::fmt::Debug;

use async_trait::async_trait;

/// A trait representing something able to open broker connections.
#[async_trait]
pub trait Connector
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the connector.
    type Error: BrokerError;

    /// The type of connection opened by the connector.
    type Connection: Connection<Error = Self::Error>;

    /// Opens a new connection to the broker at `endpoint`.
    ///
    /// `options` are passed through untouched from the caller; implementations
    /// interpret the keys they understand.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: Option<&BrokerOptions>,
    ) -> Result<Self::Connection, Self::Error>;
}

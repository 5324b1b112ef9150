use bytes::Bytes;

/// A message delivered to a subscription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    /// The channel the message was published to.
    pub channel: String,

    /// The pattern that matched, for pattern subscriptions.
    pub pattern: Option<String>,

    /// The raw payload.
    pub payload: Bytes,
}

impl Message {
    /// Creates a message received through an exact-channel subscription.
    pub fn new<C, P>(channel: C, payload: P) -> Self
    where
        C: Into<String>,
        P: Into<Bytes>,
    {
        Self {
            channel: channel.into(),
            pattern: None,
            payload: payload.into(),
        }
    }

    /// Creates a message received through a pattern subscription.
    pub fn matched<K, C, P>(pattern: K, channel: C, payload: P) -> Self
    where
        K: Into<String>,
        C: Into<String>,
        P: Into<Bytes>,
    {
        Self {
            channel: channel.into(),
            pattern: Some(pattern.into()),
            payload: payload.into(),
        }
    }
}

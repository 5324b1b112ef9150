/// The channels or glob patterns a subscription listens to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Topics {
    /// Exact channel names.
    Channels(Vec<String>),

    /// Glob patterns (`*`, `?` and `[...]` classes), matched by the broker.
    Patterns(Vec<String>),
}

impl Topics {
    /// The channel names or patterns, in subscription order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        match self {
            Self::Channels(names) | Self::Patterns(names) => names,
        }
    }

    /// Whether these topics are patterns.
    #[must_use]
    pub const fn is_pattern(&self) -> bool {
        matches!(self, Self::Patterns(_))
    }

    /// The number of channels or patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names().len()
    }

    /// Whether there is nothing to subscribe to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }
}

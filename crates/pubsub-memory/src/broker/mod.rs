use crate::error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use proven_pubsub::{Endpoint, Message, Topics};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Messages queued per subscription before further deliveries to it are dropped.
pub const SUBSCRIBER_CAPACITY: usize = 1024;

/// Global registry of running brokers, keyed by endpoint.
static BROKERS: LazyLock<DashMap<Endpoint, MemoryBroker>> = LazyLock::new(DashMap::new);

/// Matches published channels against one subscribed topic.
#[derive(Debug)]
enum Matcher {
    Channel(String),
    Pattern {
        source: String,
        pattern: glob::Pattern,
    },
}

impl Matcher {
    /// Compiles topics, dropping duplicates the way a broker ignores repeated
    /// subscriptions.
    fn compile(topics: &Topics) -> Result<Vec<Self>, Error> {
        if topics.is_empty() {
            return Err(Error::NoTopics);
        }

        let mut matchers: Vec<Self> = Vec::with_capacity(topics.len());
        for name in topics.names() {
            if matchers.iter().any(|matcher| matcher.source() == name) {
                continue;
            }

            let matcher = if topics.is_pattern() {
                let pattern = glob::Pattern::new(name).map_err(|e| Error::InvalidPattern {
                    pattern: name.clone(),
                    reason: e.msg.to_string(),
                })?;
                Self::Pattern {
                    source: name.clone(),
                    pattern,
                }
            } else {
                Self::Channel(name.clone())
            };
            matchers.push(matcher);
        }

        Ok(matchers)
    }

    fn source(&self) -> &str {
        match self {
            Self::Channel(channel) => channel,
            Self::Pattern { source, .. } => source,
        }
    }

    fn deliver(&self, channel: &str, payload: &Bytes) -> Option<Message> {
        match self {
            Self::Channel(subscribed) if subscribed == channel => {
                Some(Message::new(channel, payload.clone()))
            }
            Self::Pattern { source, pattern } if pattern.matches(channel) => {
                Some(Message::matched(source.clone(), channel, payload.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    matchers: Vec<Matcher>,
    sender: mpsc::Sender<Message>,
}

#[derive(Debug, Default)]
struct BrokerState {
    running: AtomicBool,
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

/// An in-process broker reachable at an endpoint.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    endpoint: Endpoint,
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    /// Starts a broker at `endpoint`.
    ///
    /// # Errors
    /// Returns an error if a broker is already running at the endpoint.
    pub fn start(endpoint: Endpoint) -> Result<Self, Error> {
        match BROKERS.entry(endpoint.clone()) {
            Entry::Occupied(_) => Err(Error::AlreadyRunning(endpoint)),
            Entry::Vacant(entry) => {
                let broker = Self {
                    endpoint: endpoint.clone(),
                    state: Arc::new(BrokerState {
                        running: AtomicBool::new(true),
                        subscribers: Mutex::new(HashMap::new()),
                    }),
                };
                entry.insert(broker.clone());

                info!("Memory broker started at {}", endpoint);

                Ok(broker)
            }
        }
    }

    /// Stops the broker. Every subscriber observes a closed connection.
    pub fn stop(&self) {
        BROKERS.remove_if(&self.endpoint, |_, broker| {
            Arc::ptr_eq(&broker.state, &self.state)
        });
        self.state.running.store(false, Ordering::SeqCst);
        self.state.subscribers.lock().clear();

        info!("Memory broker at {} stopped", self.endpoint);
    }

    /// The endpoint the broker is registered at.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether the broker is still accepting traffic.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// The number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.subscribers.lock().len()
    }

    /// Publishes `payload` to `channel`, returning the number of deliveries.
    ///
    /// A pattern subscription receives one delivery per matching pattern. A
    /// subscription already holding [`SUBSCRIBER_CAPACITY`] undelivered
    /// messages misses this one, and it is not counted.
    ///
    /// # Errors
    /// Returns an error if the broker has been stopped.
    pub fn publish<P>(&self, channel: &str, payload: P) -> Result<u64, Error>
    where
        P: Into<Bytes>,
    {
        if !self.is_running() {
            return Err(Error::ConnectionClosed);
        }

        let payload = payload.into();
        let mut deliveries = 0;

        let subscribers = self.state.subscribers.lock();
        for subscriber in subscribers.values() {
            for matcher in &subscriber.matchers {
                if let Some(message) = matcher.deliver(channel, &payload) {
                    match subscriber.sender.try_send(message) {
                        Ok(()) => deliveries += 1,
                        Err(TrySendError::Full(_)) => {
                            warn!("Subscriber queue full, dropping message on {}", channel);
                        }
                        Err(TrySendError::Closed(_)) => {}
                    }
                }
            }
        }
        drop(subscribers);

        debug!(
            "Published {} bytes to {} ({} deliveries)",
            payload.len(),
            channel,
            deliveries
        );

        Ok(deliveries)
    }

    pub(crate) fn lookup(endpoint: &Endpoint) -> Option<Self> {
        BROKERS
            .get(endpoint)
            .map(|broker| broker.value().clone())
            .filter(Self::is_running)
    }

    pub(crate) fn register(
        &self,
        topics: &Topics,
    ) -> Result<(Uuid, mpsc::Receiver<Message>), Error> {
        let matchers = Matcher::compile(topics)?;

        if !self.is_running() {
            return Err(Error::ConnectionClosed);
        }

        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.state
            .subscribers
            .lock()
            .insert(id, Subscriber { matchers, sender });

        debug!("Registered subscriber {} on {}", id, self.endpoint);

        Ok((id, receiver))
    }

    pub(crate) fn unregister(&self, id: &Uuid) {
        if self.state.subscribers.lock().remove(id).is_some() {
            debug!("Unregistered subscriber {} on {}", id, self.endpoint);
        }
    }
}

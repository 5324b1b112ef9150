use crate::config::{Config, Options};
use crate::error::{Error, Result};
use crate::frame::{Frame, message_frames};
use crate::transform::TransformResult;

use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use futures::stream::FuturesOrdered;
use futures::{FutureExt, Stream, StreamExt};
use parking_lot::Mutex;
use proven_pubsub::{Connection, Connector, Message, Subscription};
use tokio::sync::mpsc::{self, PermitIterator};
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type SubscriptionOf<C> = <<C as Connector>::Connection as Connection>::Subscription;

type Pending = BoxFuture<'static, (String, TransformResult)>;

type Callback = Box<dyn FnOnce() + Send>;

/// Lifecycle of a stream. Moves forward only.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Waiting for the broker to confirm the subscription.
    Connecting,
    /// Messages are flowing.
    Active,
    /// Tearing the subscription down.
    Closing,
    /// Terminal. The event stream has ended or is about to.
    Closed,
}

/// An item of the output stream. The stream ending signals the end.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// The subscription is confirmed. Follows the retry frame.
    Ready,
    /// Encoded output, ready to be written to the client.
    Frame(Bytes),
    /// Something went wrong. Only broker failures end the stream.
    Error(Arc<Error>),
}

#[derive(Default)]
struct Callbacks {
    closed: bool,
    pending: Vec<Callback>,
}

struct Shared {
    callbacks: Mutex<Callbacks>,
    cancel: CancellationToken,
    config: Config,
    ready: AtomicBool,
    state: watch::Receiver<State>,
}

/// Observes and closes a stream. Cheap to clone.
#[derive(Clone)]
pub struct SseHandle {
    shared: Arc<Shared>,
}

impl SseHandle {
    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        *self.shared.state.borrow()
    }

    /// Waits until the stream leaves `Connecting`.
    ///
    /// Returns whether it became ready. A stream that fails to subscribe, or
    /// is closed first, never does.
    pub async fn ready(&self) -> bool {
        let mut state = self.shared.state.clone();
        let _ = state.wait_for(|state| *state != State::Connecting).await;

        self.shared.ready.load(Ordering::Acquire)
    }

    /// Requests a close and waits until the stream is `Closed`.
    ///
    /// Safe to call any number of times; teardown happens once.
    pub async fn close(&self) {
        self.request_close();

        let mut state = self.shared.state.clone();
        let _ = state.wait_for(|state| *state == State::Closed).await;
    }

    /// Requests a close and runs `callback` once teardown is confirmed.
    ///
    /// If the stream is already closed, `callback` runs immediately.
    pub fn close_with<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.request_close();

        let mut callbacks = self.shared.callbacks.lock();
        if callbacks.closed {
            drop(callbacks);
            callback();
        } else {
            callbacks.pending.push(Box::new(callback));
        }
    }

    fn request_close(&self) {
        if !self.shared.cancel.is_cancelled() {
            debug!("Close requested for {:?}", self.shared.config.channels());
            self.shared.cancel.cancel();
        }
    }
}

impl Debug for SseHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseHandle")
            .field("channels", &self.shared.config.channels())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A subscription rendered as server-sent events.
///
/// Construction returns immediately in [`State::Connecting`]; subscribing
/// happens on a background task. Dropping the stream closes it.
#[derive(Debug)]
pub struct SseStream {
    events: ReceiverStream<StreamEvent>,
    handle: SseHandle,
}

impl SseStream {
    /// Validates `options` and starts subscribing through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] without connecting if the
    /// options are invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new<C>(options: Options, connector: C) -> Result<Self>
    where
        C: Connector,
    {
        let config = Config::try_from(options)?;

        Ok(Self::with_config(config, connector))
    }

    /// Starts subscribing through `connector` with an already validated config.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_config<C>(config: Config, connector: C) -> Self
    where
        C: Connector,
    {
        let (events_tx, events_rx) = mpsc::channel(config.buffer());
        let (state_tx, state_rx) = watch::channel(State::Connecting);

        let shared = Arc::new(Shared {
            callbacks: Mutex::new(Callbacks::default()),
            cancel: CancellationToken::new(),
            config,
            ready: AtomicBool::new(false),
            state: state_rx,
        });

        let driver = Driver {
            connector,
            events: events_tx,
            shared: shared.clone(),
            state: state_tx,
        };
        tokio::spawn(driver.run());

        Self {
            events: ReceiverStream::new(events_rx),
            handle: SseHandle { shared },
        }
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.handle.config()
    }

    /// A handle for observing and closing the stream.
    #[must_use]
    pub fn handle(&self) -> SseHandle {
        self.handle.clone()
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.handle.state()
    }

    /// See [`SseHandle::close`].
    pub async fn close(&self) {
        self.handle.close().await;
    }

    /// Only the encoded frames, for use as a response body.
    ///
    /// Error events are logged and left out.
    pub fn frames(self) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send {
        self.filter_map(|event| async move {
            match event {
                StreamEvent::Frame(frame) => Some(Ok(frame)),
                StreamEvent::Ready => None,
                StreamEvent::Error(error) => {
                    error!("Omitted from frame output: {}", error);
                    None
                }
            }
        })
    }
}

impl Stream for SseStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.events.poll_next_unpin(cx)
    }
}

enum Exit {
    Cancelled,
    Lost,
}

/// Background task owning the subscription.
struct Driver<C> {
    connector: C,
    events: mpsc::Sender<StreamEvent>,
    shared: Arc<Shared>,
    state: watch::Sender<State>,
}

impl<C> Driver<C>
where
    C: Connector,
{
    async fn run(self) {
        if let Some(mut subscription) = self.connect().await {
            let exit = if self.start().await {
                self.pump(&mut subscription).await
            } else {
                Exit::Cancelled
            };

            self.state.send_replace(State::Closing);
            self.teardown(subscription, exit).await;
        } else {
            self.state.send_replace(State::Closing);
        }

        self.finish();
    }

    async fn connect(&self) -> Option<SubscriptionOf<C>> {
        let config = &self.shared.config;
        debug!(
            "Subscribing to {:?} at {} (patterns: {})",
            config.channels(),
            config.endpoint(),
            config.pattern_mode()
        );

        let result = tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => {
                debug!("Closed while connecting");
                return None;
            }
            () = self.events.closed() => {
                debug!("Stream dropped while connecting");
                return None;
            }
            result = self.subscribe() => result,
        };

        match result {
            Ok(subscription) => {
                info!(
                    "Subscribed to {:?} at {}",
                    subscription.topics(),
                    config.endpoint()
                );
                Some(subscription)
            }
            Err(e) => {
                error!("Failed to subscribe at {}: {}", config.endpoint(), e);
                self.signal(Error::BrokerConnection(e.to_string())).await;
                None
            }
        }
    }

    async fn subscribe(&self) -> std::result::Result<SubscriptionOf<C>, C::Error> {
        let config = &self.shared.config;

        self.connector
            .connect(&config.endpoint(), config.broker_options())
            .await?
            .subscribe(config.topics())
            .await
    }

    /// Emits the retry frame and the ready signal. Returns false if the
    /// stream was closed first.
    async fn start(&self) -> bool {
        let Some(mut permits) = self.reserve(2).await else {
            return false;
        };

        let retry = Frame::Retry(self.shared.config.retry_interval_ms()).encode();
        if let Some(permit) = permits.next() {
            permit.send(StreamEvent::Frame(retry));
        }

        self.shared.ready.store(true, Ordering::Release);
        self.state.send_replace(State::Active);

        if let Some(permit) = permits.next() {
            permit.send(StreamEvent::Ready);
        }

        true
    }

    async fn pump<S>(&self, subscription: &mut S) -> Exit
    where
        S: Subscription,
    {
        let config = &self.shared.config;
        let mut pending = FuturesOrdered::<Pending>::new();

        loop {
            tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => {
                    debug!("Discarding {} in-flight messages", pending.len());
                    return Exit::Cancelled;
                }
                () = self.events.closed() => {
                    debug!("Stream dropped by consumer");
                    return Exit::Cancelled;
                }
                Some((channel, result)) = pending.next(), if !pending.is_empty() => {
                    match result {
                        Ok(payload) => {
                            let frames = message_frames(&channel, payload, config.channels_as_events());
                            if !self.emit(frames).await {
                                return Exit::Cancelled;
                            }
                        }
                        Err(fault) => {
                            warn!("Dropping message on {}: {}", channel, fault);
                            self.signal(Error::Transform { channel, fault }).await;
                        }
                    }
                }
                received = subscription.next_message(), if pending.len() < config.max_pending() => {
                    match received {
                        Some(Ok(message)) => pending.push_back(self.process(message)),
                        Some(Err(e)) => {
                            error!("Subscription failed: {}", e);
                            self.signal(Error::BrokerConnection(e.to_string())).await;
                            return Exit::Lost;
                        }
                        None => {
                            error!("Broker connection lost");
                            self.signal(Error::BrokerConnection("connection lost".to_string())).await;
                            return Exit::Lost;
                        }
                    }
                }
            }
        }
    }

    fn process(&self, message: Message) -> Pending {
        let config = &self.shared.config;
        let Message {
            channel,
            pattern,
            payload,
        } = message;

        debug!(
            "Received {} bytes on {} (pattern: {:?})",
            payload.len(),
            channel,
            pattern
        );

        match config.transform() {
            Some(transform) => transform
                .apply(payload, config.transform_timeout())
                .map(move |result| (channel, result))
                .boxed(),
            None => future::ready((channel, Ok(payload))).boxed(),
        }
    }

    async fn teardown<S>(&self, subscription: S, exit: Exit)
    where
        S: Subscription,
    {
        match exit {
            Exit::Lost => drop(subscription),
            Exit::Cancelled => {
                debug!("Unsubscribing from {:?}", self.shared.config.channels());

                if let Err(e) = subscription.close().await {
                    error!("Teardown failed: {}", e);
                    self.try_signal(Error::Teardown(e.to_string()));
                }
            }
        }
    }

    fn finish(self) {
        let callbacks = {
            let mut callbacks = self.shared.callbacks.lock();
            callbacks.closed = true;
            std::mem::take(&mut callbacks.pending)
        };

        for callback in callbacks {
            callback();
        }

        self.state.send_replace(State::Closed);
        info!("Stream on {:?} closed", self.shared.config.channels());
    }

    /// Waits for room for `n` events, giving up on close.
    async fn reserve(&self, n: usize) -> Option<PermitIterator<'_, StreamEvent>> {
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => None,
            permits = self.events.reserve_many(n) => permits.ok(),
        }
    }

    /// Writes one message's frames together. Returns false if the stream was
    /// closed first.
    async fn emit(&self, frames: Vec<Bytes>) -> bool {
        let Some(permits) = self.reserve(frames.len()).await else {
            return false;
        };

        for (permit, frame) in permits.zip(frames) {
            permit.send(StreamEvent::Frame(frame));
        }

        true
    }

    async fn signal(&self, error: Error) {
        match self.reserve(1).await {
            Some(mut permits) => {
                if let Some(permit) = permits.next() {
                    permit.send(StreamEvent::Error(Arc::new(error)));
                }
            }
            None => self.try_signal(error),
        }
    }

    fn try_signal(&self, error: Error) {
        let description = error.to_string();

        if self
            .events
            .try_send(StreamEvent::Error(Arc::new(error)))
            .is_err()
        {
            warn!("Error not delivered to consumer: {}", description);
        }
    }
}

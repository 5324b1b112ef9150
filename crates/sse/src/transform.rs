use crate::error::{BoxError, TransformFault};

use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tokio::sync::oneshot;

/// Outcome of transforming one payload.
pub type TransformResult = Result<Bytes, TransformFault>;

type SyncFn = dyn Fn(Bytes) -> TransformResult + Send + Sync;
type AsyncFn = dyn Fn(Bytes) -> BoxFuture<'static, TransformResult> + Send + Sync;

/// A user-supplied payload rewrite, applied before framing.
///
/// Synchronous transforms run inline as messages arrive. Asynchronous
/// transforms run concurrently with each other, and their results are still
/// emitted in arrival order.
#[derive(Clone)]
pub enum Transform {
    /// Runs inline on the stream task.
    Sync(Arc<SyncFn>),
    /// Suspends emission of its message until the future resolves.
    Async(Arc<AsyncFn>),
}

impl Transform {
    /// Infallible synchronous transform.
    pub fn sync<F, T>(f: F) -> Self
    where
        F: Fn(Bytes) -> T + Send + Sync + 'static,
        T: Into<Bytes>,
    {
        Self::Sync(Arc::new(move |payload: Bytes| -> TransformResult {
            Ok(f(payload).into())
        }))
    }

    /// Fallible synchronous transform. An error drops the message.
    pub fn try_sync<F, T, E>(f: F) -> Self
    where
        F: Fn(Bytes) -> Result<T, E> + Send + Sync + 'static,
        T: Into<Bytes>,
        E: Into<BoxError>,
    {
        Self::Sync(Arc::new(move |payload: Bytes| -> TransformResult {
            f(payload)
                .map(Into::into)
                .map_err(|e| TransformFault::Failed(e.into()))
        }))
    }

    /// Asynchronous transform returning a future.
    pub fn future<F, Fut, T, E>(f: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::Async(Arc::new(move |payload: Bytes| -> BoxFuture<'static, TransformResult> {
            let transformed = f(payload);
            async move {
                transformed
                    .await
                    .map(Into::into)
                    .map_err(|e| TransformFault::Failed(e.into()))
            }
            .boxed()
        }))
    }

    /// Asynchronous transform that reports through a [`Completion`] handle.
    ///
    /// Dropping the handle without completing it drops the message.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Bytes, Completion) + Send + Sync + 'static,
    {
        Self::Async(Arc::new(move |payload: Bytes| -> BoxFuture<'static, TransformResult> {
            let (sender, receiver) = oneshot::channel();
            f(payload, Completion { sender });
            receiver
                .map(|result| result.unwrap_or(Err(TransformFault::Abandoned)))
                .boxed()
        }))
    }

    /// Whether results are produced asynchronously.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Applies the transform to `payload`.
    ///
    /// Synchronous transforms have already run when this returns. Panics are
    /// caught and reported as [`TransformFault::Panicked`]. `timeout` bounds
    /// asynchronous transforms only.
    pub fn apply(
        &self,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> BoxFuture<'static, TransformResult> {
        match self {
            Self::Sync(f) => {
                let result = catch_unwind(AssertUnwindSafe(|| f(payload)))
                    .unwrap_or_else(|panic| Err(panicked(panic.as_ref())));
                future::ready(result).boxed()
            }
            Self::Async(f) => {
                let transformed = match catch_unwind(AssertUnwindSafe(|| f(payload))) {
                    Ok(transformed) => {
                        AssertUnwindSafe(transformed).catch_unwind().map(|result| {
                            result.unwrap_or_else(|panic| Err(panicked(panic.as_ref())))
                        })
                    }
                    Err(panic) => {
                        return future::ready(Err(panicked(panic.as_ref()))).boxed();
                    }
                };

                match timeout {
                    Some(limit) => tokio::time::timeout(limit, transformed)
                        .map(move |result| {
                            result.unwrap_or(Err(TransformFault::TimedOut(limit)))
                        })
                        .boxed(),
                    None => transformed.boxed(),
                }
            }
        }
    }
}

impl Debug for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Transform::Sync(..)"),
            Self::Async(_) => f.write_str("Transform::Async(..)"),
        }
    }
}

fn panicked(panic: &(dyn Any + Send)) -> TransformFault {
    let message = panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    TransformFault::Panicked(message)
}

/// One-shot completion handle passed to callback-style transforms.
#[derive(Debug)]
pub struct Completion {
    sender: oneshot::Sender<TransformResult>,
}

impl Completion {
    /// Completes with the transformed payload.
    pub fn complete<T>(self, payload: T)
    where
        T: Into<Bytes>,
    {
        // The receiver is gone if the stream closed in the meantime.
        let _ = self.sender.send(Ok(payload.into()));
    }

    /// Completes with an error, dropping the message.
    pub fn fail<E>(self, error: E)
    where
        E: Into<BoxError>,
    {
        let _ = self.sender.send(Err(TransformFault::Failed(error.into())));
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::Method;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::FetchxResult;
use crate::error::Error;
use crate::response::ResponseEnvelope;

/// Cancel trigger for one call.
///
/// Cloneable; every wrapper derived from the call shares the same handle,
/// so cancelling any of them cancels the underlying call exactly once.
/// Cancelling after the call settled is a silent no-op.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
    method: Method,
    url: Arc<str>,
}

impl CancelHandle {
    pub(crate) fn new(token: CancellationToken, method: Method, url: &str) -> Self {
        Self {
            token,
            method,
            url: Arc::from(url),
        }
    }

    pub fn cancel(&self) {
        if self.token.is_cancelled() {
            return;
        }
        debug!(method = %self.method, url = %self.url, "cancelling request");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn cancelled_error(&self) -> Error {
        Error::Cancelled {
            method: self.method.clone(),
            url: self.url.to_string(),
        }
    }
}

/// A request outcome that stays cancellable through derivation.
///
/// `map`/`and_then`/`or_else` consume the wrapper and return a new one
/// bound to the *original* cancel trigger. Success continuations check the
/// trigger immediately before running: a cancellation landing after the
/// inner future resolved but before the continuation executes rejects
/// first, and the continuation never runs. Error continuations do run for
/// cancellation rejections so callers can observe the sentinel status.
pub struct PendingRequest<T = ResponseEnvelope> {
    future: BoxFuture<'static, FetchxResult<T>>,
    handle: CancelHandle,
}

impl<T: Send + 'static> PendingRequest<T> {
    pub(crate) fn new(future: BoxFuture<'static, FetchxResult<T>>, handle: CancelHandle) -> Self {
        Self { future, handle }
    }

    /// Cancels the underlying call. Safe to invoke any number of times,
    /// before or after settlement.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// A detached handle for cancelling from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn map<U, F>(self, transform: F) -> PendingRequest<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let Self { future, handle } = self;
        let guard = handle.clone();
        let future = async move {
            let value = future.await?;
            if guard.is_cancelled() {
                return Err(guard.cancelled_error());
            }
            Ok(transform(value))
        }
        .boxed();
        PendingRequest { future, handle }
    }

    pub fn and_then<U, F, Fut>(self, transform: F) -> PendingRequest<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = FetchxResult<U>> + Send + 'static,
    {
        let Self { future, handle } = self;
        let guard = handle.clone();
        let future = async move {
            let value = future.await?;
            if guard.is_cancelled() {
                return Err(guard.cancelled_error());
            }
            transform(value).await
        }
        .boxed();
        PendingRequest { future, handle }
    }

    pub fn or_else<F, Fut>(self, recover: F) -> PendingRequest<T>
    where
        F: FnOnce(Error) -> Fut + Send + 'static,
        Fut: Future<Output = FetchxResult<T>> + Send + 'static,
    {
        let Self { future, handle } = self;
        let future = async move {
            match future.await {
                Ok(value) => Ok(value),
                Err(error) => recover(error).await,
            }
        }
        .boxed();
        PendingRequest { future, handle }
    }
}

impl<T> Future for PendingRequest<T> {
    type Output = FetchxResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

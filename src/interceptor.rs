use std::sync::{Arc, RwLock};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::FetchxResult;
use crate::error::Error;
use crate::options::RequestOptions;
use crate::response::ResponseEnvelope;
use crate::util::{read_unpoisoned, write_unpoisoned};

/// Transforms the request descriptor before dispatch. Runs synchronously,
/// in registration order, as a left-to-right fold.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, options: RequestOptions, url: &str) -> RequestOptions;
}

impl<F> RequestInterceptor for F
where
    F: Fn(RequestOptions, &str) -> RequestOptions + Send + Sync,
{
    fn intercept(&self, options: RequestOptions, url: &str) -> RequestOptions {
        self(options, url)
    }
}

/// Transforms the response envelope after extraction. May suspend; the
/// chain awaits each stage before starting the next.
pub trait ResponseInterceptor: Send + Sync {
    fn intercept(
        &self,
        envelope: ResponseEnvelope,
    ) -> BoxFuture<'static, FetchxResult<ResponseEnvelope>>;
}

impl<F> ResponseInterceptor for F
where
    F: Fn(ResponseEnvelope) -> FetchxResult<ResponseEnvelope> + Send + Sync,
{
    fn intercept(
        &self,
        envelope: ResponseEnvelope,
    ) -> BoxFuture<'static, FetchxResult<ResponseEnvelope>> {
        std::future::ready(self(envelope)).boxed()
    }
}

/// Observes a failed call before the error is surfaced to the caller.
/// Invoked synchronously for every registered handler; return values are
/// discarded, and handlers needing async work must spawn it themselves.
pub trait ErrorInterceptor: Send + Sync {
    fn intercept(&self, error: &Error, options: &RequestOptions, url: &str);
}

impl<F> ErrorInterceptor for F
where
    F: Fn(&Error, &RequestOptions, &str) + Send + Sync,
{
    fn intercept(&self, error: &Error, options: &RequestOptions, url: &str) {
        self(error, options, url)
    }
}

/// Runs after every call, success or failure, exactly once.
pub trait FinallyInterceptor: Send + Sync {
    fn intercept(&self, options: &RequestOptions, url: &str);
}

impl<F> FinallyInterceptor for F
where
    F: Fn(&RequestOptions, &str) + Send + Sync,
{
    fn intercept(&self, options: &RequestOptions, url: &str) {
        self(options, url)
    }
}

/// Four ordered interceptor chains shared by every call made through one
/// client. Append-only; insertion order is execution order. Each call
/// snapshots the chains at pipeline entry, so a mid-call append only
/// affects subsequent calls.
#[derive(Default)]
pub struct InterceptorRegistry {
    request: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
    error_handler: RwLock<Vec<Arc<dyn ErrorInterceptor>>>,
    finally: RwLock<Vec<Arc<dyn FinallyInterceptor>>>,
}

impl InterceptorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn push_request(&self, interceptor: impl RequestInterceptor + 'static) {
        write_unpoisoned(&self.request).push(Arc::new(interceptor));
    }

    pub fn push_response(&self, interceptor: impl ResponseInterceptor + 'static) {
        write_unpoisoned(&self.response).push(Arc::new(interceptor));
    }

    pub fn push_error(&self, interceptor: impl ErrorInterceptor + 'static) {
        write_unpoisoned(&self.error_handler).push(Arc::new(interceptor));
    }

    pub fn push_finally(&self, interceptor: impl FinallyInterceptor + 'static) {
        write_unpoisoned(&self.finally).push(Arc::new(interceptor));
    }

    pub fn request_len(&self) -> usize {
        read_unpoisoned(&self.request).len()
    }

    pub fn response_len(&self) -> usize {
        read_unpoisoned(&self.response).len()
    }

    pub fn error_len(&self) -> usize {
        read_unpoisoned(&self.error_handler).len()
    }

    pub fn finally_len(&self) -> usize {
        read_unpoisoned(&self.finally).len()
    }

    pub(crate) fn request_chain(&self) -> Vec<Arc<dyn RequestInterceptor>> {
        read_unpoisoned(&self.request).clone()
    }

    pub(crate) fn response_chain(&self) -> Vec<Arc<dyn ResponseInterceptor>> {
        read_unpoisoned(&self.response).clone()
    }

    pub(crate) fn error_chain(&self) -> Vec<Arc<dyn ErrorInterceptor>> {
        read_unpoisoned(&self.error_handler).clone()
    }

    pub(crate) fn finally_chain(&self) -> Vec<Arc<dyn FinallyInterceptor>> {
        read_unpoisoned(&self.finally).clone()
    }
}

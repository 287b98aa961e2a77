use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use http::Method;
use http::header::{HeaderName, HeaderValue};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::FetchxResult;
use crate::error::Error;
use crate::interceptor::InterceptorRegistry;
use crate::metrics::{ClientMetrics, ClientMetricsSnapshot};
use crate::options::{RequestOptions, resolve_options};
use crate::pending::{CancelHandle, PendingRequest};
use crate::response::{ResponseEnvelope, ResponseFormat, TransportResponse};
use crate::transport::{HyperTransport, Transport, TransportRequest};
use crate::util::{
    append_query_pairs, parse_header_name, parse_header_value, redact_url_for_logs,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Predicate deciding which status codes count as success.
pub type StatusValidator = Arc<dyn Fn(u16) -> bool + Send + Sync>;

fn default_validate_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Instance configuration. Unset fields fall back to the documented
/// defaults (30s timeout, JSON format, 2xx validation); the whole value is
/// immutable once a client is built.
#[derive(Clone, Default)]
pub struct ClientConfig {
    pub timeout: Option<Duration>,
    pub default_format: Option<ResponseFormat>,
    pub validate_status: Option<StatusValidator>,
}

pub struct ClientBuilder {
    default_options: RequestOptions,
    timeout: Duration,
    default_format: ResponseFormat,
    validate_status: StatusValidator,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub(crate) fn new() -> Self {
        Self {
            default_options: RequestOptions::new(),
            timeout: DEFAULT_TIMEOUT,
            default_format: ResponseFormat::Json,
            validate_status: Arc::new(default_validate_status),
            transport: None,
        }
    }

    /// Options merged under every call's own options.
    pub fn default_options(mut self, default_options: RequestOptions) -> Self {
        self.default_options = default_options;
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_options.headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> FetchxResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn default_format(mut self, default_format: ResponseFormat) -> Self {
        self.default_format = default_format;
        self
    }

    pub fn validate_status(
        mut self,
        validate_status: impl Fn(u16) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validate_status = Arc::new(validate_status);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        if let Some(timeout) = config.timeout {
            self = self.timeout(timeout);
        }
        if let Some(default_format) = config.default_format {
            self = self.default_format(default_format);
        }
        if let Some(validate_status) = config.validate_status {
            self.validate_status = validate_status;
        }
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn try_build(self) -> FetchxResult<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };
        // Abort capability is resolved exactly once, here.
        let abort_supported = transport.supports_abort();

        Ok(Client {
            transport,
            abort_supported,
            default_options: self.default_options,
            timeout: self.timeout,
            default_format: self.default_format,
            validate_status: self.validate_status,
            interceptors: Arc::new(InterceptorRegistry::new()),
            metrics: ClientMetrics::default(),
        })
    }

    pub fn build(self) -> Client {
        self.try_build()
            .unwrap_or_else(|error| panic!("failed to build fetchx client: {error}"))
    }
}

/// Builds a client over the bundled transport.
///
/// Returns `None` (logged, never panicking) when no usable transport can be
/// constructed in this environment.
pub fn create_instance(default_options: RequestOptions, config: ClientConfig) -> Option<Client> {
    match Client::builder()
        .default_options(default_options)
        .config(config)
        .try_build()
    {
        Ok(client) => Some(client),
        Err(build_error) => {
            error!(error = %build_error, "no usable http transport in this environment");
            None
        }
    }
}

/// One configured request wrapper instance.
///
/// Cheap to clone; clones share the interceptor registry and metrics.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    abort_supported: bool,
    default_options: RequestOptions,
    timeout: Duration,
    default_format: ResponseFormat,
    validate_status: StatusValidator,
    interceptors: Arc<InterceptorRegistry>,
    metrics: ClientMetrics,
}

enum RaceLoss {
    Cancelled,
    TimedOut,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The shared interceptor chains. Appends affect subsequent calls.
    pub fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }

    pub fn metrics_snapshot(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Raw call; the method is taken from `options.method` (GET when
    /// absent).
    pub fn request(
        &self,
        url: impl Into<String>,
        options: RequestOptions,
        format: Option<ResponseFormat>,
    ) -> PendingRequest {
        let method = options.method.clone().unwrap_or(Method::GET);
        self.execute(method, url.into(), options, format)
    }

    /// GET shortcut. A key-value body is serialized onto the URL's query
    /// string and discarded from the request before dispatch.
    pub fn get(
        &self,
        url: impl Into<String>,
        mut options: RequestOptions,
        format: Option<ResponseFormat>,
    ) -> PendingRequest {
        let mut url = url.into();
        if let Some(body) = options.body.take() {
            match body.query_pairs() {
                Some(pairs) => url = append_query_pairs(&url, &pairs),
                None => debug!(
                    url = %redact_url_for_logs(&url),
                    "discarding get body without enumerable keys"
                ),
            }
        }
        self.execute(Method::GET, url, options, format)
    }

    pub fn post(
        &self,
        url: impl Into<String>,
        options: RequestOptions,
        format: Option<ResponseFormat>,
    ) -> PendingRequest {
        self.execute(Method::POST, url.into(), options, format)
    }

    pub fn put(
        &self,
        url: impl Into<String>,
        options: RequestOptions,
        format: Option<ResponseFormat>,
    ) -> PendingRequest {
        self.execute(Method::PUT, url.into(), options, format)
    }

    pub fn delete(
        &self,
        url: impl Into<String>,
        options: RequestOptions,
        format: Option<ResponseFormat>,
    ) -> PendingRequest {
        self.execute(Method::DELETE, url.into(), options, format)
    }

    fn execute(
        &self,
        method: Method,
        url: String,
        options: RequestOptions,
        format: Option<ResponseFormat>,
    ) -> PendingRequest {
        let token = CancellationToken::new();
        let handle = CancelHandle::new(token.clone(), method.clone(), &url);
        let span = info_span!(
            "fetchx.request",
            method = %method,
            url = %redact_url_for_logs(&url)
        );
        let client = self.clone();
        let future = async move { client.run_pipeline(method, url, options, format, token).await }
            .instrument(span)
            .boxed();
        PendingRequest::new(future, handle)
    }

    async fn run_pipeline(
        self,
        method: Method,
        url: String,
        options: RequestOptions,
        format: Option<ResponseFormat>,
        token: CancellationToken,
    ) -> FetchxResult<ResponseEnvelope> {
        self.metrics.record_request_started();
        let _in_flight = self.metrics.enter_in_flight();

        let mut resolved = resolve_options(&self.default_options, options, method.clone());
        if method == Method::GET && resolved.body.is_some() {
            debug!("dropping merged body on get request");
            resolved.body = None;
        }
        for interceptor in self.interceptors.request_chain() {
            resolved = interceptor.intercept(resolved, &url);
        }
        // The call owns its signal slot; a caller-supplied token is replaced.
        resolved.signal = Some(token.clone());

        let format = format.unwrap_or(self.default_format);
        let outcome = self.dispatch(&url, &resolved, format, &token).await;

        if let Err(failure) = &outcome {
            warn!(code = failure.code().as_str(), error = %failure, "request failed");
            for interceptor in self.interceptors.error_chain() {
                interceptor.intercept(failure, &resolved, &url);
            }
        }
        for interceptor in self.interceptors.finally_chain() {
            interceptor.intercept(&resolved, &url);
        }
        match &outcome {
            Ok(_) => self.metrics.record_success(),
            Err(failure) => self.metrics.record_failure(failure),
        }
        outcome
    }

    async fn dispatch(
        &self,
        url: &str,
        resolved: &RequestOptions,
        format: ResponseFormat,
        token: &CancellationToken,
    ) -> FetchxResult<ResponseEnvelope> {
        // Interceptors may have rewritten the method.
        let method = resolved.method.clone().unwrap_or(Method::GET);
        let mut headers = resolved.headers.clone();
        let body = match &resolved.body {
            Some(body) => Some(body.encode(&mut headers)?),
            None => None,
        };
        let request = TransportRequest {
            method: method.clone(),
            url: url.to_owned(),
            headers,
            body,
            signal: token.clone(),
        };

        let raw = self.race_transport(&method, url, request, token).await?;

        let status = raw.status();
        self.metrics.record_response_status(status.as_u16());
        if !(self.validate_status)(status.as_u16()) {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                status_text: raw.status_text().to_owned(),
                method,
                url: url.to_owned(),
            });
        }

        let response_headers = raw.headers().clone();
        let data = raw.extract(format)?;
        let mut envelope = ResponseEnvelope {
            headers: response_headers,
            data,
            config: resolved.clone(),
            url: url.to_owned(),
        };
        for interceptor in self.interceptors.response_chain() {
            envelope = interceptor.intercept(envelope).await?;
        }
        Ok(envelope)
    }

    /// Races the spawned transport call against the instance timeout and
    /// the call's cancellation token. Cancellation wins over a
    /// simultaneously-ready transport result.
    async fn race_transport(
        &self,
        method: &Method,
        url: &str,
        request: TransportRequest,
        token: &CancellationToken,
    ) -> FetchxResult<TransportResponse> {
        debug!("sending request");
        let started = Instant::now();
        let mut in_flight = tokio::spawn(self.transport.send(request));
        let timer = sleep(self.timeout);
        tokio::pin!(timer);

        let settled = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RaceLoss::Cancelled),
            _ = &mut timer => {
                // The timer fires through the same trigger as manual cancel.
                token.cancel();
                Err(RaceLoss::TimedOut)
            }
            joined = &mut in_flight => Ok(joined),
        };

        let joined = match settled {
            Ok(joined) => joined,
            Err(loss) => {
                if self.abort_supported {
                    in_flight.abort();
                } else {
                    // No abort support: the task is detached and its I/O
                    // runs to completion unobserved.
                    drop(in_flight);
                }
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request timed out or was cancelled"
                );
                return Err(match loss {
                    RaceLoss::Cancelled => Error::Cancelled {
                        method: method.clone(),
                        url: url.to_owned(),
                    },
                    RaceLoss::TimedOut => Error::TimedOut {
                        timeout_ms: self.timeout.as_millis(),
                        method: method.clone(),
                        url: url.to_owned(),
                    },
                });
            }
        };

        match joined {
            Ok(Ok(response)) => {
                debug!(
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request completed"
                );
                Ok(response)
            }
            Ok(Err(source)) => Err(Error::Transport {
                method: method.clone(),
                url: url.to_owned(),
                source,
            }),
            Err(join_error) => Err(Error::Transport {
                method: method.clone(),
                url: url.to_owned(),
                source: Box::new(join_error),
            }),
        }
    }
}

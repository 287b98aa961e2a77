use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio_util::sync::CancellationToken;

use crate::FetchxResult;
use crate::error::{BoxError, Error};
use crate::response::TransportResponse;

/// Wire-ready request handed to a transport: encoded body bytes, merged
/// headers, and the call's cancellation signal.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Shared cancellation signal for this call. Transports that can abort
    /// mid-flight should observe it.
    pub signal: CancellationToken,
}

/// The underlying network call.
///
/// Implementations return a fully buffered [`TransportResponse`]; redirect
/// policy is entirely theirs. Errors surface to the caller as
/// [`Error::Transport`](crate::Error::Transport).
pub trait Transport: Send + Sync + 'static {
    /// Whether losing the timeout/cancel race can abort this transport's
    /// in-flight I/O. Read once at client construction; when false, a
    /// cancelled call still rejects immediately but the I/O runs to
    /// completion unobserved.
    fn supports_abort(&self) -> bool {
        true
    }

    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, BoxError>>;
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Bundled transport: hyper client over rustls with webpki roots, HTTP/1.1
/// and HTTP/2. Does not follow redirects.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient<HttpsConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> FetchxResult<Self> {
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| Error::TransportInit {
                message: source.to_string(),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = HyperClient::builder(TokioExecutor::new()).build(https);
        Ok(Self { client })
    }
}

impl Transport for HyperTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, BoxError>> {
        let client = self.client.clone();
        async move {
            let uri: Uri = request
                .url
                .parse()
                .map_err(|_| format!("invalid request url: {}", request.url))?;
            let mut http_request = http::Request::builder()
                .method(request.method)
                .uri(uri)
                .body(Full::new(request.body.unwrap_or_default()))?;
            *http_request.headers_mut() = request.headers;

            let response = tokio::select! {
                biased;
                _ = request.signal.cancelled() => return Err("transport call aborted".into()),
                response = client.request(http_request) => response?,
            };

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.into_body().collect().await?.to_bytes();
            Ok(TransportResponse::new(status, headers, body))
        }
        .boxed()
    }
}

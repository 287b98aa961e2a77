use std::collections::HashMap;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::FetchxResult;
use crate::error::Error;
use crate::util::{merge_headers, parse_header_name, parse_header_value};

/// Per-call request options; once merged with instance defaults and run
/// through the request-interceptor chain this is the effective request
/// descriptor for one call. Built fresh per call, never shared.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Method for raw calls; verb shortcuts overwrite it.
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Cancellation-signal slot. The pipeline populates it with the call's
    /// own token; a caller-supplied value is replaced.
    pub signal: Option<CancellationToken>,
    /// Opaque metadata handed through to interceptors, never interpreted.
    pub meta: HashMap<String, serde_json::Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> FetchxResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn json<T>(mut self, payload: &T) -> FetchxResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(payload).map_err(|source| Error::SerializeJson { source })?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn form<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.body = Some(RequestBody::Form(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        ));
        self
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

/// Request payload accepted by the wrapper.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Bytes(Bytes),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// `key=value` pairs for the GET convenience form; `None` when the body
    /// has no enumerable keys.
    pub(crate) fn query_pairs(&self) -> Option<Vec<(String, String)>> {
        match self {
            Self::Form(pairs) => Some(pairs.clone()),
            Self::Json(serde_json::Value::Object(map)) => Some(
                map.iter()
                    .map(|(key, value)| (key.clone(), query_value(value)))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Encodes the payload to wire bytes, defaulting the content type when
    /// the caller did not set one.
    pub(crate) fn encode(&self, headers: &mut HeaderMap) -> FetchxResult<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Json(value) => {
                let encoded = serde_json::to_vec(value)
                    .map_err(|source| Error::SerializeJson { source })?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Ok(Bytes::from(encoded))
            }
            Self::Form(pairs) => {
                let encoded = serde_urlencoded::to_string(pairs)
                    .map_err(|source| Error::SerializeForm { source })?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    );
                }
                Ok(Bytes::from(encoded))
            }
        }
    }
}

fn query_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Merges instance defaults with per-call options. Per-call keys win on
/// header collisions; the per-call body, signal, and metadata each fall
/// back to the instance default when absent.
pub(crate) fn resolve_options(
    defaults: &RequestOptions,
    call: RequestOptions,
    method: Method,
) -> RequestOptions {
    let headers = merge_headers(&defaults.headers, &call.headers);
    let body = call.body.or_else(|| defaults.body.clone());
    let meta = if call.meta.is_empty() {
        defaults.meta.clone()
    } else {
        call.meta
    };
    let signal = call.signal.or_else(|| defaults.signal.clone());
    RequestOptions {
        method: Some(method),
        headers,
        body,
        signal,
        meta,
    }
}

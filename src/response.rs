use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::FetchxResult;
use crate::error::Error;
use crate::options::RequestOptions;
use crate::util::truncate_body;

/// Body-extraction mode requested for a call.
///
/// Each format maps 1:1 to a typed extraction method on
/// [`TransportResponse`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResponseFormat {
    #[default]
    Json,
    Text,
    FormData,
    Blob,
    ArrayBuffer,
}

impl ResponseFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::FormData => "form_data",
            Self::Blob => "blob",
            Self::ArrayBuffer => "array_buffer",
        }
    }
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Buffered response handed back by a [`Transport`](crate::Transport).
///
/// The wrapper never streams; transports read the whole body before
/// returning.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn json<T>(&self) -> FetchxResult<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| Error::DecodeBody {
            format: ResponseFormat::Json,
            message: format!("{source}; body={}", truncate_body(&self.body)),
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn form_data(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.body)
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect()
    }

    pub fn blob(&self) -> Blob {
        let content_type = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        Blob {
            content_type,
            bytes: self.body.clone(),
        }
    }

    pub fn array_buffer(&self) -> Bytes {
        self.body.clone()
    }

    /// Dispatches to the extraction method matching `format`.
    pub fn extract(self, format: ResponseFormat) -> FetchxResult<ResponseData> {
        match format {
            ResponseFormat::Json => self.json().map(ResponseData::Json),
            ResponseFormat::Text => Ok(ResponseData::Text(self.text())),
            ResponseFormat::FormData => Ok(ResponseData::Form(self.form_data())),
            ResponseFormat::Blob => Ok(ResponseData::Blob(self.blob())),
            ResponseFormat::ArrayBuffer => Ok(ResponseData::Buffer(self.array_buffer())),
        }
    }
}

/// Binary body plus the content type it was served with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Extracted response body in the format the caller requested.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseData {
    Json(serde_json::Value),
    Text(String),
    Form(Vec<(String, String)>),
    Blob(Blob),
    Buffer(Bytes),
}

impl ResponseData {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(blob) => Some(&blob.bytes),
            Self::Buffer(bytes) => Some(bytes),
            Self::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn into_json<T>(self) -> FetchxResult<T>
    where
        T: DeserializeOwned,
    {
        match self {
            Self::Json(value) => {
                serde_json::from_value(value).map_err(|source| Error::DecodeBody {
                    format: ResponseFormat::Json,
                    message: source.to_string(),
                })
            }
            other => Err(Error::DecodeBody {
                format: ResponseFormat::Json,
                message: format!("response data is {} not json", other.kind()),
            }),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Text(_) => "text",
            Self::Form(_) => "form_data",
            Self::Blob(_) => "blob",
            Self::Buffer(_) => "array_buffer",
        }
    }
}

/// Successful outcome of one call, folded through the response-interceptor
/// chain.
///
/// `config` is the request as resolved after request interceptors ran.
#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
    pub headers: HeaderMap,
    pub data: ResponseData,
    pub config: RequestOptions,
    pub url: String,
}

use http::Method;
use thiserror::Error;

use crate::response::ResponseFormat;

/// Boxed error type carried by transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Sentinel status reported for timeout and cancellation rejections.
/// Never a real HTTP code.
pub const TIMEOUT_STATUS: i32 = -1;

const TIMEOUT_STATUS_TEXT: &str = "Timeout";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    Timeout,
    Cancelled,
    HttpStatus,
    Transport,
    DecodeBody,
    SerializeJson,
    SerializeForm,
    InvalidHeaderName,
    InvalidHeaderValue,
    TransportInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::HttpStatus => "http_status",
            Self::Transport => "transport",
            Self::DecodeBody => "decode_body",
            Self::SerializeJson => "serialize_json",
            Self::SerializeForm => "serialize_form",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::TransportInit => "transport_init",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("http request timed out after {timeout_ms}ms for {method} {url}")]
    TimedOut {
        timeout_ms: u128,
        method: Method,
        url: String,
    },
    #[error("http request was cancelled for {method} {url}")]
    Cancelled { method: Method, url: String },
    #[error("http status error {status} {status_text} for {method} {url}")]
    HttpStatus {
        status: u16,
        status_text: String,
        method: Method,
        url: String,
    },
    #[error("http transport error for {method} {url}: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to decode response body as {format}: {message}")]
    DecodeBody {
        format: ResponseFormat,
        message: String,
    },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize request form: {source}")]
    SerializeForm {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to initialize http transport: {message}")]
    TransportInit { message: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TimedOut { .. } => ErrorCode::Timeout,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::DecodeBody { .. } => ErrorCode::DecodeBody,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::SerializeForm { .. } => ErrorCode::SerializeForm,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::TransportInit { .. } => ErrorCode::TransportInit,
        }
    }

    /// Uniform rejection status: the [`TIMEOUT_STATUS`] sentinel for timeout
    /// and cancellation, the real code for status rejections, `None` for
    /// everything else.
    pub const fn status(&self) -> Option<i32> {
        match self {
            Self::TimedOut { .. } | Self::Cancelled { .. } => Some(TIMEOUT_STATUS),
            Self::HttpStatus { status, .. } => Some(*status as i32),
            _ => None,
        }
    }

    pub fn status_text(&self) -> Option<&str> {
        match self {
            Self::TimedOut { .. } | Self::Cancelled { .. } => Some(TIMEOUT_STATUS_TEXT),
            Self::HttpStatus { status_text, .. } => Some(status_text),
            _ => None,
        }
    }

    pub const fn is_timeout_or_cancelled(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::Cancelled { .. })
    }
}

//! `fetchx` wraps a pluggable HTTP transport with the four things the
//! transport does not do natively: chainable request/response/error/finally
//! interceptors, per-request timeout enforcement, manual cancellation that
//! survives continuation chaining, and uniform status validation.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use fetchx::{Client, RequestOptions, ResponseFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .timeout(Duration::from_secs(5))
//!         .try_default_header("user-agent", "fetchx-demo")?
//!         .try_build()?;
//!
//!     client.interceptors().push_finally(|_options: &RequestOptions, url: &str| {
//!         println!("completed {url}");
//!     });
//!
//!     let pending = client.get(
//!         "https://api.example.com/items",
//!         RequestOptions::new(),
//!         Some(ResponseFormat::Json),
//!     );
//!     let cancel = pending.cancel_handle(); // callable from any task
//!     let envelope = pending.await?;
//!     drop(cancel);
//!     println!("{:?}", envelope.data);
//!     Ok(())
//! }
//! ```
//!
//! # Cancellation
//!
//! Every call returns a [`PendingRequest`]: a future plus a cancel trigger
//! that survives `map`/`and_then`/`or_else` derivation. Cancelling rejects
//! with the sentinel status [`TIMEOUT_STATUS`] and, when the transport
//! supports it, aborts the in-flight I/O. Timeouts fire the same trigger.

mod client;
mod error;
mod interceptor;
mod metrics;
mod options;
mod pending;
mod response;
mod transport;
mod util;

pub use crate::client::{Client, ClientBuilder, ClientConfig, StatusValidator, create_instance};
pub use crate::error::{BoxError, Error, ErrorCode, TIMEOUT_STATUS};
pub use crate::interceptor::{
    ErrorInterceptor, FinallyInterceptor, InterceptorRegistry, RequestInterceptor,
    ResponseInterceptor,
};
pub use crate::metrics::ClientMetricsSnapshot;
pub use crate::options::{RequestBody, RequestOptions};
pub use crate::pending::{CancelHandle, PendingRequest};
pub use crate::response::{
    Blob, ResponseData, ResponseEnvelope, ResponseFormat, TransportResponse,
};
pub use crate::transport::{HyperTransport, Transport, TransportRequest};

pub type FetchxResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        Client, ClientConfig, Error, ErrorCode, FetchxResult, PendingRequest, RequestBody,
        RequestOptions, ResponseData, ResponseEnvelope, ResponseFormat, TIMEOUT_STATUS, Transport,
        TransportRequest, TransportResponse, create_instance,
    };
}

#[cfg(test)]
mod tests;

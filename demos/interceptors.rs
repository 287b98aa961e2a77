use std::time::Duration;

use fetchx::{Client, Error, FetchxResult, RequestOptions, ResponseEnvelope, ResponseFormat};
use http::header::{HeaderName, HeaderValue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = Client::builder().timeout(Duration::from_secs(5)).try_build()?;

    client
        .interceptors()
        .push_request(|options: RequestOptions, url: &str| {
            println!("-> {url}");
            options.header(
                HeaderName::from_static("x-demo-trace"),
                HeaderValue::from_static("fetchx"),
            )
        });
    client
        .interceptors()
        .push_response(|envelope: ResponseEnvelope| -> FetchxResult<ResponseEnvelope> {
            println!("<- {} ({} headers)", envelope.url, envelope.headers.len());
            Ok(envelope)
        });
    client
        .interceptors()
        .push_error(|error: &Error, _options: &RequestOptions, url: &str| {
            println!("!! {url}: status={:?} {error}", error.status());
        });
    client
        .interceptors()
        .push_finally(|_options: &RequestOptions, url: &str| {
            println!("-- done {url}");
        });

    let ok = client
        .get(
            "https://httpbin.org/get",
            RequestOptions::new(),
            Some(ResponseFormat::Json),
        )
        .await?;
    println!("ok: {:?}", ok.data.as_json().map(|value| value.get("url")));

    // 404 runs the error chain, then surfaces with the real status.
    let missing = client
        .get(
            "https://httpbin.org/status/404",
            RequestOptions::new(),
            Some(ResponseFormat::Text),
        )
        .await;
    println!("missing: {:?}", missing.err().and_then(|error| error.status()));

    // Cancellation fires the same sentinel path as a timeout.
    let slow = client.get(
        "https://httpbin.org/delay/10",
        RequestOptions::new(),
        Some(ResponseFormat::Json),
    );
    let cancel = slow.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
    });
    println!("slow: {:?}", slow.await.err().and_then(|error| error.status()));

    println!("metrics: {:#?}", client.metrics_snapshot());
    Ok(())
}

use std::time::Duration;

use fetchx::{Client, RequestOptions, ResponseFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = Client::builder()
        .timeout(Duration::from_secs(5))
        .try_default_header("user-agent", "fetchx-demo")?
        .try_build()?;

    // A key-value body on the GET form is serialized onto the query string.
    let envelope = client
        .get(
            "https://httpbin.org/get",
            RequestOptions::new().form([("q", "fetchx")]),
            Some(ResponseFormat::Json),
        )
        .await?;

    println!("data: {:#?}", envelope.data);
    Ok(())
}

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use fetchx::{
    BoxError, Client, Error, FetchxResult, RequestOptions, ResponseData, ResponseEnvelope,
    ResponseFormat, TIMEOUT_STATUS, Transport, TransportRequest, TransportResponse,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::header::HeaderValue;
use http::{HeaderMap, Method, StatusCode};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct MockReply {
    status: u16,
    headers: Vec<(&'static str, &'static str)>,
    body: Vec<u8>,
    delay: Duration,
}

impl MockReply {
    fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }
}

#[derive(Clone, Debug)]
struct CapturedRequest {
    method: String,
    url: String,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
}

struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    captured: Mutex<Vec<CapturedRequest>>,
    completed: Arc<AtomicUsize>,
    abortable: bool,
    fail_with: Option<String>,
}

impl MockTransport {
    fn new(replies: Vec<MockReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            captured: Mutex::new(Vec::new()),
            completed: Arc::new(AtomicUsize::new(0)),
            abortable: true,
            fail_with: None,
        })
    }

    fn non_abortable(replies: Vec<MockReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            captured: Mutex::new(Vec::new()),
            completed: Arc::new(AtomicUsize::new(0)),
            abortable: false,
            fail_with: None,
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            captured: Mutex::new(Vec::new()),
            completed: Arc::new(AtomicUsize::new(0)),
            abortable: true,
            fail_with: Some(message.to_owned()),
        })
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().expect("lock captured requests").clone()
    }

    fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn supports_abort(&self) -> bool {
        self.abortable
    }

    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, BoxError>> {
        self.captured
            .lock()
            .expect("lock captured requests")
            .push(CapturedRequest {
                method: request.method.to_string(),
                url: request.url.clone(),
                headers: request
                    .headers
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.as_str().to_owned(),
                            value.to_str().unwrap_or_default().to_owned(),
                        )
                    })
                    .collect(),
                body: request.body.as_ref().map(|bytes| bytes.to_vec()),
            });

        if let Some(message) = &self.fail_with {
            let message = message.clone();
            return async move { Err(message.into()) }.boxed();
        }

        let reply = self
            .replies
            .lock()
            .expect("lock scripted replies")
            .pop_front()
            .unwrap_or_else(|| MockReply::new(200, ""));
        let completed = Arc::clone(&self.completed);
        async move {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            let mut headers = HeaderMap::new();
            for (name, value) in reply.headers {
                headers.insert(name, HeaderValue::from_static(value));
            }
            completed.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse::new(
                StatusCode::from_u16(reply.status).expect("scripted status is valid"),
                headers,
                Bytes::from(reply.body),
            ))
        }
        .boxed()
    }
}

fn client_over(transport: Arc<MockTransport>) -> Client {
    Client::builder()
        .transport(transport)
        .timeout(Duration::from_secs(2))
        .build()
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
}

#[tokio::test]
async fn get_resolves_text_body() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));

    let envelope = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("get should resolve");
    assert_eq!(envelope.data.as_text(), Some("rt"));
    assert_eq!(envelope.url, "http://h/r");
    assert_eq!(transport.requests()[0].method, "GET");
}

#[tokio::test]
async fn raw_request_takes_method_from_options() {
    let transport = MockTransport::new(vec![MockReply::new(200, "ok")]);
    let client = client_over(Arc::clone(&transport));

    client
        .request(
            "http://h/r",
            RequestOptions::new().method(Method::OPTIONS),
            Some(ResponseFormat::Text),
        )
        .await
        .expect("raw request should resolve");
    assert_eq!(transport.requests()[0].method, "OPTIONS");
}

#[tokio::test]
async fn verb_shortcuts_dispatch_expected_methods() {
    let transport = MockTransport::new(vec![
        MockReply::new(200, "added"),
        MockReply::new(200, "saved"),
        MockReply::new(200, "deleted"),
    ]);
    let client = client_over(Arc::clone(&transport));

    let added = client
        .post("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("post should resolve");
    let saved = client
        .put("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("put should resolve");
    let deleted = client
        .delete("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("delete should resolve");

    assert_eq!(added.data.as_text(), Some("added"));
    assert_eq!(saved.data.as_text(), Some("saved"));
    assert_eq!(deleted.data.as_text(), Some("deleted"));
    let methods: Vec<String> = transport
        .requests()
        .into_iter()
        .map(|request| request.method)
        .collect();
    assert_eq!(methods, vec!["POST", "PUT", "DELETE"]);
}

#[tokio::test]
async fn get_serializes_key_value_body_onto_query() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));

    client
        .get(
            "http://h/r",
            RequestOptions::new().form([("a", "1"), ("b", "two")]),
            Some(ResponseFormat::Text),
        )
        .await
        .expect("get should resolve");

    let captured = transport.requests();
    assert_eq!(captured[0].url, "http://h/r?a=1&b=two");
    assert_eq!(captured[0].body, None);
}

#[tokio::test]
async fn get_appends_to_existing_query_with_ampersand() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));

    client
        .get(
            "http://h/r?x=0",
            RequestOptions::new().form([("a", "1")]),
            Some(ResponseFormat::Text),
        )
        .await
        .expect("get should resolve");

    assert_eq!(transport.requests()[0].url, "http://h/r?x=0&a=1");
}

#[tokio::test]
async fn request_interceptors_fold_in_registration_order() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));

    client
        .interceptors()
        .push_request(|options: RequestOptions, _url: &str| {
            options
                .try_header("x-order", "1")
                .expect("header should parse")
        });
    client
        .interceptors()
        .push_request(|options: RequestOptions, _url: &str| {
            let previous = options
                .headers
                .get("x-order")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            options
                .try_header("x-order", &format!("{previous}2"))
                .expect("header should parse")
        });

    let envelope = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("get should resolve");

    assert_eq!(transport.requests()[0].headers.get("x-order").unwrap(), "12");
    assert_eq!(envelope.config.headers.get("x-order").unwrap(), "12");
}

#[tokio::test]
async fn request_interceptor_header_lands_in_envelope_config() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));

    client
        .interceptors()
        .push_request(|options: RequestOptions, _url: &str| {
            options
                .try_header("x-test", "v")
                .expect("header should parse")
        });

    let envelope = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("get should resolve");
    assert_eq!(envelope.config.headers.get("x-test").unwrap(), "v");
}

struct SlowTag(&'static str);

impl fetchx::ResponseInterceptor for SlowTag {
    fn intercept(
        &self,
        mut envelope: ResponseEnvelope,
    ) -> BoxFuture<'static, FetchxResult<ResponseEnvelope>> {
        let tag = self.0;
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let ResponseData::Text(text) = &mut envelope.data {
                text.push('|');
                text.push_str(tag);
            }
            Ok(envelope)
        }
        .boxed()
    }
}

#[tokio::test]
async fn response_interceptors_chain_in_order_across_suspension() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));

    // The first interceptor suspends; the second must still see its output.
    client.interceptors().push_response(SlowTag("slow"));
    client.interceptors().push_response(
        |mut envelope: ResponseEnvelope| -> FetchxResult<ResponseEnvelope> {
            if let ResponseData::Text(text) = &mut envelope.data {
                text.push_str("|fast");
            }
            Ok(envelope)
        },
    );

    let envelope = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("get should resolve");
    assert_eq!(envelope.data.as_text(), Some("rt|slow|fast"));
}

#[tokio::test]
async fn response_interceptor_failure_funnels_to_error_chain() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));
    let (errors, finals) = counter();

    client.interceptors().push_response(
        |envelope: ResponseEnvelope| -> FetchxResult<ResponseEnvelope> {
            Err(Error::DecodeBody {
                format: ResponseFormat::Text,
                message: format!("rejected payload from {}", envelope.url),
            })
        },
    );
    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |_error: &Error, _options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    let seen = Arc::clone(&finals);
    client
        .interceptors()
        .push_finally(move |_options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let error = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect_err("interceptor failure should reject the call");
    match error {
        Error::DecodeBody { message, .. } => assert!(message.contains("http://h/r")),
        other => panic!("unexpected error variant: {other}"),
    }
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(finals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_status_skips_extraction_and_reaches_error_chain() {
    // Body is not valid json: reaching extraction would surface DecodeBody,
    // so an HttpStatus error proves extraction never ran.
    let transport = MockTransport::new(vec![MockReply::new(404, "not-json")]);
    let client = client_over(Arc::clone(&transport));
    let (errors, finals) = counter();

    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |error: &Error, _options: &RequestOptions, _url: &str| {
            assert_eq!(error.status(), Some(404));
            seen.fetch_add(1, Ordering::SeqCst);
        });
    let seen = Arc::clone(&finals);
    client
        .interceptors()
        .push_finally(move |_options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let error = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Json))
        .await
        .expect_err("404 should reject");
    match error {
        Error::HttpStatus {
            status,
            status_text,
            ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(status_text, "Not Found");
        }
        other => panic!("unexpected error variant: {other}"),
    }
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(finals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn redirect_choice_statuses_surface_as_status_errors() {
    let transport = MockTransport::new(vec![
        MockReply::new(300, "").header("location", "/ok"),
        MockReply::new(305, "").header("location", "/ok"),
    ]);
    let client = client_over(Arc::clone(&transport));

    let multi_choice = client
        .get("http://h/multi-choice", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect_err("300 should reject");
    assert_eq!(multi_choice.status(), Some(300));

    let use_proxy = client
        .get("http://h/use-proxy", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect_err("305 should reject");
    assert_eq!(use_proxy.status(), Some(305));
}

#[tokio::test]
async fn custom_status_validator_accepts_3xx() {
    let transport = MockTransport::new(vec![MockReply::new(300, "choices")]);
    let client = Client::builder()
        .transport(transport)
        .validate_status(|status| status < 400)
        .build();

    let envelope = client
        .get("http://h/multi-choice", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("300 should pass the custom validator");
    assert_eq!(envelope.data.as_text(), Some("choices"));
}

#[tokio::test]
async fn finally_runs_exactly_once_on_success() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));
    let (errors, finals) = counter();

    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |_error: &Error, _options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    let seen = Arc::clone(&finals);
    client
        .interceptors()
        .push_finally(move |_options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("get should resolve");
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(finals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timeout_rejects_with_sentinel_status() {
    let transport =
        MockTransport::new(vec![MockReply::new(200, "rt").delayed(Duration::from_millis(500))]);
    let client = Client::builder()
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .timeout(Duration::from_millis(250))
        .build();
    let (errors, _) = counter();

    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |error: &Error, _options: &RequestOptions, _url: &str| {
            assert_eq!(error.status(), Some(TIMEOUT_STATUS));
            assert_eq!(error.status_text(), Some("Timeout"));
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let error = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect_err("slow transport should time out");
    assert_eq!(error.status(), Some(TIMEOUT_STATUS));
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    let snapshot = client.metrics_snapshot();
    assert_eq!(snapshot.timeouts, 1);
    assert_eq!(snapshot.requests_failed, 1);
}

#[tokio::test]
async fn manual_cancel_rejects_with_sentinel_status() {
    let transport =
        MockTransport::new(vec![MockReply::new(200, "rt").delayed(Duration::from_millis(500))]);
    let client = client_over(Arc::clone(&transport));
    let (errors, _) = counter();

    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |_error: &Error, _options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let pending = client.get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text));
    let cancel = pending.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let error = pending.await.expect_err("cancelled call should reject");
    assert_eq!(error.status(), Some(TIMEOUT_STATUS));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelling_derived_chain_skips_continuations() {
    let transport =
        MockTransport::new(vec![MockReply::new(200, "rt").delayed(Duration::from_millis(500))]);
    let client = client_over(Arc::clone(&transport));
    let (errors, continuations) = counter();

    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |_error: &Error, _options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let first = Arc::clone(&continuations);
    let second = Arc::clone(&continuations);
    let derived = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .map(move |envelope| {
            first.fetch_add(1, Ordering::SeqCst);
            envelope
        })
        .map(move |envelope| {
            second.fetch_add(1, Ordering::SeqCst);
            envelope
        });

    // Cancel through the derived wrapper: the trigger is the original one.
    let cancel = derived.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let error = derived.await.expect_err("cancelled chain should reject");
    assert_eq!(error.status(), Some(TIMEOUT_STATUS));
    assert_eq!(continuations.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn or_else_recovers_after_cancellation() {
    let transport =
        MockTransport::new(vec![MockReply::new(200, "rt").delayed(Duration::from_millis(500))]);
    let client = client_over(Arc::clone(&transport));

    let pending = client.get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text));
    let cancel = pending.cancel_handle();
    let recovered = pending.or_else(|error| async move {
        assert_eq!(error.status(), Some(TIMEOUT_STATUS));
        Err(error)
    });
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    recovered
        .await
        .expect_err("recovery handler re-raises the sentinel");
}

#[tokio::test]
async fn cancel_after_settlement_is_a_noop() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));
    let (errors, _) = counter();

    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |_error: &Error, _options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let pending = client.get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text));
    let cancel = pending.cancel_handle();
    let envelope = pending.await.expect("get should resolve");
    assert_eq!(envelope.data.as_text(), Some("rt"));

    cancel.cancel();
    cancel.cancel();
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn abortable_transport_is_aborted_on_cancel() {
    let transport =
        MockTransport::new(vec![MockReply::new(200, "rt").delayed(Duration::from_millis(200))]);
    let client = client_over(Arc::clone(&transport));

    let pending = client.get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text));
    let cancel = pending.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    pending.await.expect_err("cancelled call should reject");

    // The aborted task never reaches its completion marker.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(transport.completed_count(), 0);
}

#[tokio::test]
async fn non_abortable_transport_runs_to_completion_after_cancel() {
    let transport = MockTransport::non_abortable(vec![
        MockReply::new(200, "rt").delayed(Duration::from_millis(200)),
    ]);
    let client = client_over(Arc::clone(&transport));

    let pending = client.get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text));
    let cancel = pending.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let error = pending.await.expect_err("cancelled call still rejects");
    assert_eq!(error.status(), Some(TIMEOUT_STATUS));

    // Capability gap: the rejection was delivered but the detached I/O
    // finished anyway.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(transport.completed_count(), 1);
}

#[tokio::test]
async fn default_format_falls_back_to_json() {
    let transport = MockTransport::new(vec![
        MockReply::new(200, r#"{"id": 1}"#),
        MockReply::new(200, r#"{"id": 2}"#),
    ]);
    let client = client_over(Arc::clone(&transport));

    let as_default = client
        .get("http://h/r", RequestOptions::new(), None)
        .await
        .expect("get should resolve");
    assert_eq!(as_default.data.as_json(), Some(&serde_json::json!({"id": 1})));

    let as_text = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("get should resolve");
    assert_eq!(as_text.data.as_text(), Some(r#"{"id": 2}"#));
}

#[tokio::test]
async fn default_headers_merge_under_per_call_headers() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = Client::builder()
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .try_default_header("x-base", "1")
        .expect("header should parse")
        .try_default_header("x-shared", "base")
        .expect("header should parse")
        .build();

    client
        .get(
            "http://h/r",
            RequestOptions::new()
                .try_header("x-shared", "call")
                .expect("header should parse"),
            Some(ResponseFormat::Text),
        )
        .await
        .expect("get should resolve");

    let captured = transport.requests();
    assert_eq!(captured[0].headers.get("x-base").unwrap(), "1");
    assert_eq!(captured[0].headers.get("x-shared").unwrap(), "call");
}

#[tokio::test]
async fn transport_failure_propagates_through_error_chain() {
    let transport = MockTransport::failing("connection refused");
    let client = client_over(Arc::clone(&transport));
    let (errors, finals) = counter();

    let seen = Arc::clone(&errors);
    client
        .interceptors()
        .push_error(move |error: &Error, _options: &RequestOptions, _url: &str| {
            assert_eq!(error.status(), None);
            seen.fetch_add(1, Ordering::SeqCst);
        });
    let seen = Arc::clone(&finals);
    client
        .interceptors()
        .push_finally(move |_options: &RequestOptions, _url: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let error = client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect_err("transport failure should reject");
    match error {
        Error::Transport { source, .. } => {
            assert!(source.to_string().contains("connection refused"));
        }
        other => panic!("unexpected error variant: {other}"),
    }
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(finals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn caller_supplied_signal_is_replaced() {
    let transport = MockTransport::new(vec![MockReply::new(200, "rt")]);
    let client = client_over(Arc::clone(&transport));

    // A pre-cancelled caller token must not affect the call.
    let foreign = CancellationToken::new();
    foreign.cancel();
    let mut options = RequestOptions::new();
    options.signal = Some(foreign);

    let envelope = client
        .get("http://h/r", options, Some(ResponseFormat::Text))
        .await
        .expect("call should ignore the caller token");
    assert_eq!(envelope.data.as_text(), Some("rt"));
    let replaced = envelope.config.signal.expect("signal slot is populated");
    assert!(!replaced.is_cancelled());
}

#[tokio::test]
async fn metrics_snapshot_tracks_outcomes() {
    let transport = MockTransport::new(vec![
        MockReply::new(200, "rt"),
        MockReply::new(404, "missing"),
    ]);
    let client = client_over(Arc::clone(&transport));

    client
        .get("http://h/r", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect("first call should resolve");
    client
        .get("http://h/missing", RequestOptions::new(), Some(ResponseFormat::Text))
        .await
        .expect_err("second call should reject");

    let snapshot = client.metrics_snapshot();
    assert_eq!(snapshot.requests_started, 2);
    assert_eq!(snapshot.requests_succeeded, 1);
    assert_eq!(snapshot.requests_failed, 1);
    assert_eq!(snapshot.http_status_errors, 1);
    assert_eq!(snapshot.in_flight, 0);
    assert_eq!(snapshot.status_counts.get(&200), Some(&1));
    assert_eq!(snapshot.status_counts.get(&404), Some(&1));
    assert_eq!(snapshot.error_counts.get("http_status"), Some(&1));
}

//! HTTP dispatch against a mock job endpoint.

use queue_worker::{
    DispatchError, DispatchOutcome, HttpDispatcher, JobDispatcher, Message, RecordingSink,
    WorkerConfig, QUEUE_FORWARDED_HEADER,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &str = r#"{"task":"thumbnail","id":42}"#;

fn dispatcher(server: &MockServer, timeout: Duration) -> (HttpDispatcher, RecordingSink) {
    let config = WorkerConfig::new(
        "memory://jobs",
        format!("{}/jobs", server.uri()),
    )
    .with_job_timeout(timeout);
    let sink = RecordingSink::new();
    let dispatcher = HttpDispatcher::new(
        HttpDispatcher::build_client().unwrap(),
        &config,
        Arc::new(sink.clone()),
    );
    (dispatcher, sink)
}

fn message() -> Message {
    Message::new("handle-1", BODY)
        .with_message_id("msg-1")
        .with_receive_count(1)
}

#[tokio::test]
async fn test_success_posts_body_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(header("content-type", "application/json"))
        .and(header(QUEUE_FORWARDED_HEADER, "2"))
        .and(body_string(BODY))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (dispatcher, sink) = dispatcher(&server, Duration::from_secs(5));
    let outcome = dispatcher.dispatch(&message()).await;

    assert_eq!(outcome, DispatchOutcome::Success);
    assert_eq!(sink.count("received"), 1);
    assert_eq!(sink.count("success"), 1);
    assert_eq!(sink.count("error"), 0);
    assert_eq!(sink.samples("response_time").len(), 1);
}

#[tokio::test]
async fn test_any_2xx_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher(&server, Duration::from_secs(5));
    assert!(dispatcher.dispatch(&message()).await.is_success());
}

#[tokio::test]
async fn test_server_error_is_rejected_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let (dispatcher, sink) = dispatcher(&server, Duration::from_secs(5));
    let outcome = dispatcher.dispatch(&message()).await;

    assert_eq!(
        outcome,
        DispatchOutcome::Failure(DispatchError::rejected(
            500,
            "500 Internal Server Error",
            "database unavailable"
        ))
    );
    assert_eq!(sink.count("success"), 0);
    assert_eq!(
        sink.tags_for("error"),
        vec![vec![(
            "status".to_string(),
            "500 Internal Server Error".to_string()
        )]]
    );
    assert_eq!(sink.samples("response_time").len(), 1);
}

#[tokio::test]
async fn test_rejected_body_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("x".repeat(100_000)))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher(&server, Duration::from_secs(5));
    let outcome = dispatcher.dispatch(&message()).await;

    match outcome {
        DispatchOutcome::Failure(DispatchError::Rejected {
            status,
            body_snippet,
            ..
        }) => {
            assert_eq!(status, 422);
            assert_eq!(body_snippet.len(), queue_worker::MAX_BODY_SNIPPET);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let (dispatcher, sink) = dispatcher(&server, Duration::from_millis(200));
    let outcome = dispatcher.dispatch(&message()).await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Failure(DispatchError::Transport { timed_out: true, .. })
    ));
    assert_eq!(
        sink.tags_for("error"),
        vec![vec![("status".to_string(), "timeout".to_string())]]
    );
    assert_eq!(sink.samples("response_time").len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_failure() {
    // Bind then drop a listener so the port refuses connections.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let config = WorkerConfig::new("memory://jobs", format!("http://{addr}/jobs"))
        .with_job_timeout(Duration::from_secs(2));
    let sink = RecordingSink::new();
    let dispatcher = HttpDispatcher::new(
        HttpDispatcher::build_client().unwrap(),
        &config,
        Arc::new(sink.clone()),
    );

    let outcome = dispatcher.dispatch(&message()).await;

    assert!(
        matches!(
            outcome,
            DispatchOutcome::Failure(DispatchError::Transport { timed_out: false, .. })
        ),
        "unexpected outcome {outcome:?}"
    );
    assert_eq!(
        sink.tags_for("error"),
        vec![vec![("status".to_string(), "transport_error".to_string())]]
    );
    assert_eq!(sink.count("received"), 1);
    assert_eq!(sink.samples("response_time").len(), 1);
}

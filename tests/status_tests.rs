//! Integration tests for status reporting against a local Pushgateway
//!
//! An axum server stands in for the Pushgateway and forwards every request
//! it receives to the test.

use std::process::ExitCode;

use axum::http::{StatusCode, Uri};
use axum::Router;
use drone_helm3::helm::{ErrorKind, HelmError};
use drone_helm3::status::{PushError, PushgatewayReporter, StatusReporter};
use drone_helm3::subprocess::ProcessError;
use tokio::sync::mpsc;

/// Serve `status` for every request; returns the base url and the
/// received `(path, body)` pairs.
async fn pushgateway(status: StatusCode) -> (String, mpsc::UnboundedReceiver<(String, String)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().fallback(move |uri: Uri, body: String| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((uri.path().to_string(), body));
            status
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), rx)
}

fn reporter(url: &str) -> PushgatewayReporter {
    PushgatewayReporter::new(url, "octocat/hello-world", "apps", "myapp").unwrap()
}

#[tokio::test]
async fn test_success_is_pushed() {
    let (url, mut rx) = pushgateway(StatusCode::OK).await;

    let code = reporter(&url).status(&Ok(()), "done").await;
    assert_eq!(code, ExitCode::SUCCESS);

    let (path, body) = rx.recv().await.unwrap();
    assert_eq!(
        path,
        "/job/drone_helm3/repo@base64/b2N0b2NhdC9oZWxsby13b3JsZA==\
         /namespace@base64/YXBwcw==/release@base64/bXlhcHA="
    );
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("# TYPE drone_helm3_build_status gauge"));
    let sample = lines.next().unwrap();
    let timestamp = sample
        .strip_prefix("drone_helm3_build_status{status=\"success\"} ")
        .unwrap();
    assert!(timestamp.parse::<i64>().unwrap() > 1_600_000_000);
}

#[tokio::test]
async fn test_failure_kind_is_pushed() {
    let (url, mut rx) = pushgateway(StatusCode::OK).await;
    let result = Err(HelmError::wrap(
        ProcessError::ExitCode(1),
        "release and rollback failed",
        ErrorKind::RollbackFailed,
    ));

    let code = reporter(&url).status(&result, "done").await;
    assert_eq!(code, ExitCode::FAILURE);

    let (_, body) = rx.recv().await.unwrap();
    assert!(body.contains("drone_helm3_build_status{status=\"rollback_failed\"}"));
}

#[tokio::test]
async fn test_rejected_push_does_not_change_exit_code() {
    let (url, _rx) = pushgateway(StatusCode::INTERNAL_SERVER_ERROR).await;
    let reporter = reporter(&url);

    let err = reporter.push("success").await.unwrap_err();
    assert!(matches!(err, PushError::Status { status: 500, .. }));

    assert_eq!(reporter.status(&Ok(()), "done").await, ExitCode::SUCCESS);
}

#[tokio::test]
async fn test_unreachable_pushgateway_is_not_fatal() {
    // Grab a free port, then close it again
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let reporter = reporter(&format!("http://{addr}"));
    assert!(matches!(
        reporter.push("success").await,
        Err(PushError::Request(_))
    ));
    assert_eq!(reporter.status(&Ok(()), "done").await, ExitCode::SUCCESS);
}

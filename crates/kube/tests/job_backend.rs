//! Job backend against a stand-in API server.
//!
//! The Job never finishes, so every run here ends by timeout or by being
//! dropped, and the Job must still be deleted.

#![allow(clippy::panic)]

use std::time::Duration;

use serde_json::json;
use vigil_core::{CheckId, ExecutionPayload};
use vigil_kube::{JobConfig, KubeJobBackend};
use vigil_reconciler::{ExecutionBackend, ExecutionRequest};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOBS: &str = "/apis/batch/v1/namespaces/monitoring/jobs";

async fn api_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/apis/vigil.dev/v1/namespaces/monitoring/checks/web"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "checks.vigil.dev \"web\" not found",
            "reason": "NotFound",
            "code": 404
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(JOBS))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "web-run", "namespace": "monitoring" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(format!("^{JOBS}/web-[0-9a-z]+/status$")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "web-run", "namespace": "monitoring" },
            "status": { "active": 1 }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/monitoring/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": {},
            "items": []
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path_regex(format!("^{JOBS}/web-[0-9a-z]+$")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Success"
        })))
        .mount(&server)
        .await;

    server
}

fn backend(server: &MockServer) -> Result<KubeJobBackend, Box<dyn std::error::Error>> {
    let config = kube::Config::new(server.uri().parse()?);
    let client = kube::Client::try_from(config)?;
    Ok(KubeJobBackend::new(
        client,
        JobConfig {
            poll_interval: Duration::from_millis(100),
            ..JobConfig::default()
        },
    ))
}

fn request(timeout: Duration) -> ExecutionRequest {
    ExecutionRequest {
        check: CheckId::new("monitoring", "web"),
        payload: ExecutionPayload::image("busybox"),
        timeout,
    }
}

async fn count_requests(server: &MockServer, verb: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path().starts_with(JOBS))
        .count()
}

/// Wait up to two seconds for the guard's background delete to arrive.
async fn wait_for_delete(server: &MockServer) -> usize {
    for _ in 0..40 {
        let deletes = count_requests(server, "DELETE").await;
        if deletes > 0 {
            return deletes;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    0
}

#[tokio::test]
async fn given_job_that_never_finishes_when_timeout_elapses_then_job_is_deleted()
-> Result<(), Box<dyn std::error::Error>> {
    let server = api_server().await;
    let backend = backend(&server)?;

    let result = backend.run(request(Duration::from_millis(500))).await?;

    assert!(result.timed_out);
    assert!(result.started);
    assert!(result.detail.contains("exceeded timeout"));
    assert_eq!(count_requests(&server, "POST").await, 1);
    assert_eq!(wait_for_delete(&server).await, 1);
    Ok(())
}

#[tokio::test]
async fn given_run_in_flight_when_run_is_dropped_then_job_is_deleted()
-> Result<(), Box<dyn std::error::Error>> {
    let server = api_server().await;
    let backend = backend(&server)?;

    let run = tokio::spawn(async move { backend.run(request(Duration::from_secs(60))).await });

    for _ in 0..40 {
        if count_requests(&server, "POST").await > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(count_requests(&server, "POST").await, 1);
    assert_eq!(count_requests(&server, "DELETE").await, 0);

    run.abort();
    assert!(run.await.is_err_and(|e| e.is_cancelled()));
    assert_eq!(wait_for_delete(&server).await, 1);
    Ok(())
}

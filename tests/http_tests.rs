//! HTTP surface tests: the commit inlet and the runner registration
//! endpoints, served over a real listener and driven with an HTTP client.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use narwhal::config::{DispatcherConfig, RunnerConfig};
use narwhal::dispatch::DispatchEngine;
use narwhal::error::WorkerError;
use narwhal::grpc::{self, RunnerService};
use narwhal::http::{self, AppState};
use narwhal::intake::Intake;
use narwhal::registry::RunnerRegistry;
use narwhal::repository::Repository;
use narwhal::worker::{ContainerConfig, ContainerRuntime, JobExecutor, VcsClient};

struct FakeVcs;

#[async_trait]
impl VcsClient for FakeVcs {
    async fn clone_repository(
        &self,
        _repository: &Repository,
        dest: &Path,
    ) -> Result<(), WorkerError> {
        tokio::fs::write(
            dest.join(narwhal::manifest::MANIFEST_FILE),
            "steps:\n  - name: t\n    command: exit 0\n",
        )
        .await
        .map_err(|e| WorkerError::Internal(e.to_string()))
    }
}

struct NullRuntime;

#[async_trait]
impl ContainerRuntime for NullRuntime {
    async fn ensure_image(&self, _image: &str) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn create(&self, _config: &ContainerConfig) -> Result<String, WorkerError> {
        Ok("ctr-0".to_string())
    }

    async fn start(&self, _id: &str) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn wait(&self, _id: &str) -> Result<i64, WorkerError> {
        Ok(0)
    }

    async fn remove(&self, _id: &str) -> Result<(), WorkerError> {
        Ok(())
    }
}

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

struct TestDispatcher {
    base: String,
    registry: Arc<RunnerRegistry>,
    _shutdown: CancellationToken,
}

/// Serve the dispatcher surface on an ephemeral port and wait for it to
/// accept connections.
async fn start_dispatcher(client: &reqwest::Client, queue_capacity: usize) -> TestDispatcher {
    let registry = Arc::new(RunnerRegistry::new());
    let config = DispatcherConfig {
        queue_capacity,
        ..DispatcherConfig::default()
    };
    let engine = Arc::new(DispatchEngine::new(registry.clone(), &config));
    let intake = Arc::new(Intake::new(engine));

    let addr = free_addr();
    let state = AppState {
        intake,
        registry: registry.clone(),
    };
    let shutdown = CancellationToken::new();
    tokio::spawn(http::serve(addr, state, shutdown.clone()));

    let base = format!("http://{}", addr);
    for _ in 0..50 {
        if client.get(format!("{}/runner", base)).send().await.is_ok() {
            return TestDispatcher {
                base,
                registry,
                _shutdown: shutdown,
            };
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("dispatcher at {} never came up", base);
}

/// Spawn a runner service backed by fakes; returns its address.
fn start_runner(work_root: &Path) -> SocketAddr {
    let addr = free_addr();
    let config = RunnerConfig {
        listen_addr: addr,
        work_root: work_root.to_path_buf(),
        ..RunnerConfig::default()
    };
    let executor = Arc::new(JobExecutor::with_collaborators(
        Arc::new(FakeVcs),
        Arc::new(NullRuntime),
        &config,
    ));
    // The token is never cancelled; the server lives for the whole test.
    tokio::spawn(grpc::serve(
        addr,
        RunnerService::new(executor),
        CancellationToken::new(),
    ));
    addr
}

/// The dispatcher dials the runner back before accepting, so retry while
/// the runner's listener comes up.
async fn register_with_retry(client: &reqwest::Client, base: &str, addr: &str) {
    for _ in 0..50 {
        let response = client
            .post(format!("{}/runner", base))
            .json(&serde_json::json!({ "addr": addr }))
            .send()
            .await
            .unwrap();
        if response.status().is_success() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("runner at {} never registered", addr);
}

fn commit_body(id: &str, repo: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "timestamp": Utc::now().to_rfc3339(),
        "repository": {
            "hosting_service": "github",
            "name": repo,
            "branch": "master",
        },
    })
}

#[tokio::test]
async fn test_submit_commit_accepts_then_conflicts() {
    let client = reqwest::Client::new();
    let dispatcher = start_dispatcher(&client, 16).await;

    let response = client
        .post(format!("{}/commit", dispatcher.base))
        .json(&commit_body("a1", "x/y"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["commit"], "a1");

    // The same commit again is a duplicate.
    let response = client
        .post(format!("{}/commit", dispatcher.base))
        .json(&commit_body("a1", "x/y"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_submit_commit_rejects_malformed_bodies() {
    let client = reqwest::Client::new();
    let dispatcher = start_dispatcher(&client, 16).await;

    // Not JSON at all.
    let response = client
        .post(format!("{}/commit", dispatcher.base))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    // Well-formed JSON failing field validation.
    let response = client
        .post(format!("{}/commit", dispatcher.base))
        .json(&commit_body("", "x/y"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_commit_backpressure() {
    let client = reqwest::Client::new();
    // Queue of one, nothing draining it.
    let dispatcher = start_dispatcher(&client, 1).await;

    let response = client
        .post(format!("{}/commit", dispatcher.base))
        .json(&commit_body("a1", "x/a"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = client
        .post(format!("{}/commit", dispatcher.base))
        .json(&commit_body("b1", "x/b"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_runner_registration_lifecycle() {
    let client = reqwest::Client::new();
    let dispatcher = start_dispatcher(&client, 16).await;
    let root = tempfile::tempdir().unwrap();
    let runner_addr = start_runner(root.path()).to_string();

    register_with_retry(&client, &dispatcher.base, &runner_addr).await;
    assert_eq!(dispatcher.registry.len(), 1);

    // Registering the same address again conflicts.
    let response = client
        .post(format!("{}/runner", dispatcher.base))
        .json(&serde_json::json!({ "addr": runner_addr }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    // The listing shows the handle with its alive bit.
    let response = client
        .get(format!("{}/runner", dispatcher.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let runners: serde_json::Value = response.json().await.unwrap();
    assert_eq!(runners[0]["addr"], runner_addr);
    assert_eq!(runners[0]["alive"], true);

    // Removal empties the registry.
    let response = client
        .delete(format!("{}/runner", dispatcher.base))
        .json(&serde_json::json!({ "addr": runner_addr }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(dispatcher.registry.is_empty());

    // Removing an unknown address is reported, not swallowed.
    let response = client
        .delete(format!("{}/runner", dispatcher.base))
        .json(&serde_json::json!({ "addr": runner_addr }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_unreachable_runner() {
    let client = reqwest::Client::new();
    let dispatcher = start_dispatcher(&client, 16).await;

    // Nothing listens on a reserved port.
    let response = client
        .post(format!("{}/runner", dispatcher.base))
        .json(&serde_json::json!({ "addr": "127.0.0.1:1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    assert!(dispatcher.registry.is_empty());
}

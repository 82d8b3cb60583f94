use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use narwhal::config::{DispatcherConfig, RunnerConfig};
use narwhal::dispatch::DispatchEngine;
use narwhal::error::WorkerError;
use narwhal::job::Job;
use narwhal::manifest::MANIFEST_FILE;
use narwhal::registry::{RunnerHandle, RunnerRegistry};
use narwhal::repository::{Commit, HostingService, Repository};
use narwhal::worker::{
    ContainerConfig, ContainerRuntime, JobExecutor, LocalRunnerChannel, VcsClient,
};

/// Clone stand-in that materializes a manifest instead of hitting the
/// network. `manifest: None` produces a repository without one.
struct FakeVcs {
    manifest: Option<String>,
}

#[async_trait]
impl VcsClient for FakeVcs {
    async fn clone_repository(
        &self,
        _repository: &Repository,
        dest: &Path,
    ) -> Result<(), WorkerError> {
        if let Some(manifest) = &self.manifest {
            tokio::fs::write(dest.join(MANIFEST_FILE), manifest)
                .await
                .map_err(|e| WorkerError::Internal(e.to_string()))?;
        }
        Ok(())
    }
}

struct FailingVcs;

#[async_trait]
impl VcsClient for FailingVcs {
    async fn clone_repository(
        &self,
        _repository: &Repository,
        _dest: &Path,
    ) -> Result<(), WorkerError> {
        Err(WorkerError::CloneError("remote hung up".to_string()))
    }
}

/// Container runtime recording every call; exit codes are scripted per
/// container in creation order (missing entries exit 0).
#[derive(Default)]
struct FakeRuntime {
    created: Mutex<Vec<ContainerConfig>>,
    removed: Mutex<Vec<String>>,
    exit_codes: Mutex<Vec<i64>>,
    next_id: AtomicUsize,
}

impl FakeRuntime {
    fn with_exit_codes(codes: &[i64]) -> Self {
        Self {
            exit_codes: Mutex::new(codes.to_vec()),
            ..Self::default()
        }
    }

    fn created_commands(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_image(&self, _image: &str) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn create(&self, config: &ContainerConfig) -> Result<String, WorkerError> {
        let index = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(config.clone());
        Ok(format!("ctr-{}", index))
    }

    async fn start(&self, _id: &str) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<i64, WorkerError> {
        let index: usize = id
            .trim_start_matches("ctr-")
            .parse()
            .map_err(|_| WorkerError::Internal("unknown container".to_string()))?;
        Ok(*self.exit_codes.lock().unwrap().get(index).unwrap_or(&0))
    }

    async fn remove(&self, id: &str) -> Result<(), WorkerError> {
        self.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

fn job() -> Job {
    Job::new(Commit {
        id: "ab23f".to_string(),
        language: None,
        timestamp: Utc::now(),
        repository: Repository {
            hosting_service: HostingService::GitHub,
            name: "johndoe/test-repo".to_string(),
            branch: "master".to_string(),
        },
    })
}

fn executor(
    vcs: Arc<dyn VcsClient>,
    runtime: Arc<dyn ContainerRuntime>,
    work_root: PathBuf,
) -> JobExecutor {
    let config = RunnerConfig {
        work_root,
        ..RunnerConfig::default()
    };
    JobExecutor::with_collaborators(vcs, runtime, &config)
}

async fn workspace_entries(root: &Path) -> usize {
    let mut entries = tokio::fs::read_dir(root).await.unwrap();
    let mut count = 0;
    while entries.next_entry().await.unwrap().is_some() {
        count += 1;
    }
    count
}

#[tokio::test]
async fn test_happy_path_runs_all_steps() {
    let root = tempfile::tempdir().unwrap();
    let vcs = Arc::new(FakeVcs {
        manifest: Some("steps:\n  - name: t\n    command: exit 0\n".to_string()),
    });
    let runtime = Arc::new(FakeRuntime::default());
    let executor = executor(vcs, runtime.clone(), root.path().to_path_buf());

    executor.execute(job()).await.unwrap();

    assert_eq!(runtime.created_commands(), vec!["exit 0"]);
    // Workspace is gone after the run.
    assert_eq!(workspace_entries(root.path()).await, 0);
}

#[tokio::test]
async fn test_step_failure_stops_the_job() {
    let root = tempfile::tempdir().unwrap();
    let vcs = Arc::new(FakeVcs {
        manifest: Some(
            "steps:\n  - name: t\n    command: exit 7\n  - name: after\n    command: exit 0\n"
                .to_string(),
        ),
    });
    let runtime = Arc::new(FakeRuntime::with_exit_codes(&[7]));
    let executor = executor(vcs, runtime.clone(), root.path().to_path_buf());

    let err = executor.execute(job()).await.unwrap_err();

    assert_eq!(
        err,
        WorkerError::StepFailed {
            name: "t".to_string(),
            code: 7,
        }
    );
    assert_eq!(err.to_string(), "step t failed: exit 7");
    // The second step never ran.
    assert_eq!(runtime.created_commands().len(), 1);
    assert_eq!(workspace_entries(root.path()).await, 0);
}

#[tokio::test]
async fn test_missing_manifest_fails_before_any_container() {
    let root = tempfile::tempdir().unwrap();
    let vcs = Arc::new(FakeVcs { manifest: None });
    let runtime = Arc::new(FakeRuntime::default());
    let executor = executor(vcs, runtime.clone(), root.path().to_path_buf());

    let err = executor.execute(job()).await.unwrap_err();

    assert!(matches!(err, WorkerError::ManifestError(_)));
    assert!(err.to_string().starts_with("manifest"));
    assert!(runtime.created_commands().is_empty());
    assert_eq!(workspace_entries(root.path()).await, 0);
}

#[tokio::test]
async fn test_clone_failure_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::default());
    let executor = executor(Arc::new(FailingVcs), runtime, root.path().to_path_buf());

    let err = executor.execute(job()).await.unwrap_err();

    assert!(matches!(err, WorkerError::CloneError(_)));
    assert_eq!(workspace_entries(root.path()).await, 0);
}

#[tokio::test]
async fn test_dependencies_installed_before_command() {
    let root = tempfile::tempdir().unwrap();
    let vcs = Arc::new(FakeVcs {
        manifest: Some(
            r#"
env:
  CI: "true"
steps:
  - name: t
    dependencies: [curl, make]
    command: make test
"#
            .to_string(),
        ),
    });
    let runtime = Arc::new(FakeRuntime::default());
    let executor = executor(vcs, runtime.clone(), root.path().to_path_buf());

    executor.execute(job()).await.unwrap();

    let created = runtime.created.lock().unwrap();
    assert_eq!(
        created[0].command,
        "apt-get update && apt-get install -y curl make && make test"
    );
    assert_eq!(created[0].image, "ubuntu");
    assert_eq!(created[0].env.get("CI").unwrap(), "true");
}

#[tokio::test]
async fn test_containers_removed_after_each_step() {
    let root = tempfile::tempdir().unwrap();
    let vcs = Arc::new(FakeVcs {
        manifest: Some(
            "steps:\n  - name: a\n    command: exit 0\n  - name: b\n    command: exit 0\n"
                .to_string(),
        ),
    });
    let runtime = Arc::new(FakeRuntime::default());
    let executor = executor(vcs, runtime.clone(), root.path().to_path_buf());

    executor.execute(job()).await.unwrap();

    assert_eq!(
        runtime.removed.lock().unwrap().as_slice(),
        &["ctr-0".to_string(), "ctr-1".to_string()]
    );
}

/// The engine dispatches over the capability, not the transport: a local
/// in-process channel receives jobs the same way a remote runner does.
#[tokio::test]
async fn test_dispatch_through_local_channel() {
    let root = tempfile::tempdir().unwrap();
    let vcs = Arc::new(FakeVcs {
        manifest: Some("steps:\n  - name: t\n    command: exit 0\n".to_string()),
    });
    let runtime = Arc::new(FakeRuntime::default());
    let executor = Arc::new(executor(vcs, runtime.clone(), root.path().to_path_buf()));

    let registry = Arc::new(RunnerRegistry::new());
    registry
        .insert(RunnerHandle::new(
            "local",
            Arc::new(LocalRunnerChannel::new(executor)),
        ))
        .unwrap();

    let config = DispatcherConfig {
        queue_capacity: 8,
        ..DispatcherConfig::default()
    };
    let engine = DispatchEngine::new(registry, &config);
    engine.run(1).await;
    engine.enqueue(job()).unwrap();
    engine.stop().await;

    assert_eq!(runtime.created_commands(), vec!["exit 0"]);
    assert_eq!(workspace_entries(root.path()).await, 0);
}

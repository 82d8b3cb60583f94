use std::collections::HashMap;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::WorkerError;

/// Lifecycle of a worker-side step container. `Restarting` is reserved;
/// the executor never re-runs a crashed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Initing,
    Running,
    Stopped,
    Crashed,
    Restarting,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Initing => write!(f, "initing"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Stopped => write!(f, "stopped"),
            ContainerState::Crashed => write!(f, "crashed"),
            ContainerState::Restarting => write!(f, "restarting"),
        }
    }
}

/// Bookkeeping for one step container.
#[derive(Debug)]
pub struct StepContainer {
    pub id: String,
    pub state: ContainerState,
}

impl StepContainer {
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: ContainerState::Initing,
        }
    }
}

/// Everything needed to create one step container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    /// Shell line run through `sh -c`.
    pub command: String,
    pub env: HashMap<String, String>,
}

/// Operations the executor invokes on the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Make `image` available locally, pulling it if missing.
    async fn ensure_image(&self, image: &str) -> Result<(), WorkerError>;

    /// Create a container, returning its id.
    async fn create(&self, config: &ContainerConfig) -> Result<String, WorkerError>;

    /// Start a created container.
    async fn start(&self, id: &str) -> Result<(), WorkerError>;

    /// Block until the container terminates; returns its exit code.
    async fn wait(&self, id: &str) -> Result<i64, WorkerError>;

    /// Delete a terminated container.
    async fn remove(&self, id: &str) -> Result<(), WorkerError>;
}

/// `docker` CLI-backed runtime.
#[derive(Debug, Clone, Default)]
pub struct DockerCli;

impl DockerCli {
    async fn docker<I, S>(args: I) -> Result<Output, WorkerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| WorkerError::Internal(e.to_string()))
    }

    fn stderr(output: &Output) -> String {
        String::from_utf8_lossy(&output.stderr).trim().to_string()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ensure_image(&self, image: &str) -> Result<(), WorkerError> {
        let inspect = Self::docker(["image", "inspect", image]).await?;
        if inspect.status.success() {
            return Ok(());
        }
        tracing::info!(image, "Pulling image");
        let pull = Self::docker(["pull", image]).await?;
        if pull.status.success() {
            Ok(())
        } else {
            Err(WorkerError::ImagePullError(Self::stderr(&pull)))
        }
    }

    async fn create(&self, config: &ContainerConfig) -> Result<String, WorkerError> {
        let mut args = vec!["create".to_string()];
        for (key, value) in &config.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(config.image.clone());
        args.extend(["sh".to_string(), "-c".to_string(), config.command.clone()]);

        let output = Self::docker(&args).await?;
        if !output.status.success() {
            return Err(WorkerError::ContainerCreateError(Self::stderr(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn start(&self, id: &str) -> Result<(), WorkerError> {
        let output = Self::docker(["start", id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(WorkerError::Internal(Self::stderr(&output)))
        }
    }

    async fn wait(&self, id: &str) -> Result<i64, WorkerError> {
        let output = Self::docker(["wait", id]).await?;
        if !output.status.success() {
            return Err(WorkerError::Internal(Self::stderr(&output)));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|e| WorkerError::Internal(format!("bad wait status: {}", e)))
    }

    async fn remove(&self, id: &str) -> Result<(), WorkerError> {
        let output = Self::docker(["rm", "-f", id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(WorkerError::Internal(Self::stderr(&output)))
        }
    }
}

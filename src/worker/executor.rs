use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::error::WorkerError;
use crate::job::Job;
use crate::manifest::{JobSpec, Step};
use crate::worker::container::{ContainerConfig, ContainerRuntime, ContainerState, DockerCli, StepContainer};
use crate::worker::vcs::{GitCli, VcsClient};

/// Exit code reported for a step whose container outlived its deadline,
/// mirroring the shell timeout convention.
const TIMEOUT_EXIT_CODE: i64 = 124;

/// Runs one job start to finish: clone the repository into a fresh
/// workspace, load the manifest, run each step in a container, clean up.
pub struct JobExecutor {
    vcs: Arc<dyn VcsClient>,
    runtime: Arc<dyn ContainerRuntime>,
    work_root: PathBuf,
    step_timeout: Duration,
}

impl JobExecutor {
    pub fn new(config: &RunnerConfig) -> Self {
        Self::with_collaborators(Arc::new(GitCli), Arc::new(DockerCli), config)
    }

    /// Build an executor around explicit collaborators; tests use fakes
    /// where the real ones would need git or a container daemon.
    pub fn with_collaborators(
        vcs: Arc<dyn VcsClient>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &RunnerConfig,
    ) -> Self {
        Self {
            vcs,
            runtime,
            work_root: config.work_root.clone(),
            step_timeout: config.step_timeout,
        }
    }

    /// Execute `job`. The clone directory is removed on every exit path.
    pub async fn execute(&self, mut job: Job) -> Result<(), WorkerError> {
        let workdir = self.work_root.join(format!("narwhal-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| WorkerError::Internal(e.to_string()))?;

        let result = self.execute_in(&mut job, &workdir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
            tracing::warn!(dir = %workdir.display(), error = %e, "Failed to remove workspace");
        }
        result
    }

    async fn execute_in(&self, job: &mut Job, workdir: &Path) -> Result<(), WorkerError> {
        tracing::info!(
            commit = %job.commit.id,
            repository = %job.commit.repository.name,
            "Executing job"
        );
        self.vcs
            .clone_repository(&job.commit.repository, workdir)
            .await?;

        let spec = JobSpec::load(workdir).await?;
        let step_timeout = if spec.timeout_secs > 0 {
            Duration::from_secs(spec.timeout_secs)
        } else {
            self.step_timeout
        };
        job.spec = Some(spec.clone());

        for step in &spec.steps {
            self.run_step(&spec, step, step_timeout).await?;
        }
        tracing::info!(commit = %job.commit.id, "Job succeeded");
        Ok(())
    }

    /// Run one step container through its lifecycle. A non-zero exit
    /// terminates the job.
    async fn run_step(
        &self,
        spec: &JobSpec,
        step: &Step,
        step_timeout: Duration,
    ) -> Result<(), WorkerError> {
        self.runtime.ensure_image(&spec.image).await?;

        let config = ContainerConfig {
            image: spec.image.clone(),
            command: step.shell_command(),
            env: spec.env.clone(),
        };
        let id = self.runtime.create(&config).await?;
        let mut container = StepContainer::new(id);
        tracing::debug!(step = %step.name, container = %container.id, "Step container created");

        let exit_code = self.drive(&mut container, step_timeout).await;

        if let Err(e) = self.runtime.remove(&container.id).await {
            tracing::warn!(container = %container.id, error = %e, "Failed to remove container");
        }

        match exit_code? {
            0 => {
                tracing::info!(step = %step.name, "Step succeeded");
                Ok(())
            }
            code => {
                tracing::warn!(step = %step.name, code, "Step failed");
                Err(WorkerError::StepFailed {
                    name: step.name.clone(),
                    code,
                })
            }
        }
    }

    /// Start the container and wait for it, tracking state transitions.
    async fn drive(
        &self,
        container: &mut StepContainer,
        step_timeout: Duration,
    ) -> Result<i64, WorkerError> {
        if let Err(e) = self.runtime.start(&container.id).await {
            container.state = ContainerState::Crashed;
            return Err(e);
        }
        container.state = ContainerState::Running;

        match timeout(step_timeout, self.runtime.wait(&container.id)).await {
            Ok(Ok(0)) => {
                container.state = ContainerState::Stopped;
                Ok(0)
            }
            Ok(Ok(code)) => {
                container.state = ContainerState::Crashed;
                Ok(code)
            }
            Ok(Err(e)) => {
                container.state = ContainerState::Crashed;
                Err(e)
            }
            Err(_) => {
                container.state = ContainerState::Crashed;
                tracing::warn!(container = %container.id, "Step timed out");
                Ok(TIMEOUT_EXIT_CODE)
            }
        }
    }
}

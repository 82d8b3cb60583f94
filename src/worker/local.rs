use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::job::Job;
use crate::registry::RunnerChannel;
use crate::worker::JobExecutor;

/// In-process runner variant: jobs run through a local executor instead
/// of a remote process. Useful for single-host deployments where the
/// dispatcher doubles as its own worker.
pub struct LocalRunnerChannel {
    executor: Arc<JobExecutor>,
}

impl LocalRunnerChannel {
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl RunnerChannel for LocalRunnerChannel {
    async fn heart_beat(&self) -> Result<bool, DispatchError> {
        Ok(true)
    }

    async fn run_job(&self, job: Job) -> Result<(), DispatchError> {
        self.executor
            .execute(job)
            .await
            .map_err(|e| DispatchError::RpcFailure(e.to_string()))
    }
}

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::grpc::convert::commit_from_proto;
use crate::job::Job;
use crate::proto::runner_server::{Runner, RunnerServer};
use crate::proto::{HeartBeatRequest, HeartBeatResponse, RunJobRequest, RunJobResponse};
use crate::worker::JobExecutor;

/// RPC surface each runner process exposes to the dispatcher. Every call
/// is served on its own task, so a runner may execute several jobs
/// concurrently; the executor isolates them in per-job workspaces.
pub struct RunnerService {
    executor: Arc<JobExecutor>,
}

impl RunnerService {
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        Self { executor }
    }

    pub fn into_server(self) -> RunnerServer<Self> {
        RunnerServer::new(self)
    }
}

#[tonic::async_trait]
impl Runner for RunnerService {
    async fn heart_beat(
        &self,
        _request: Request<HeartBeatRequest>,
    ) -> Result<Response<HeartBeatResponse>, Status> {
        Ok(Response::new(HeartBeatResponse { alive: true }))
    }

    /// Execute the job synchronously for the caller; execution failures
    /// travel in the reply's error string, not as an RPC status.
    async fn run_job(
        &self,
        request: Request<RunJobRequest>,
    ) -> Result<Response<RunJobResponse>, Status> {
        let commit = request
            .into_inner()
            .commit
            .ok_or_else(|| Status::invalid_argument("missing commit"))?;
        let commit = commit_from_proto(commit).map_err(Status::invalid_argument)?;

        let job = Job::new(commit);
        let reply = match self.executor.execute(job).await {
            Ok(()) => RunJobResponse {
                ok: true,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Job failed");
                RunJobResponse {
                    ok: false,
                    error: Some(e.to_string()),
                }
            }
        };
        Ok(Response::new(reply))
    }
}

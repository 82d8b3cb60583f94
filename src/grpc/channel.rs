use async_trait::async_trait;
use tonic::transport::Channel;

use crate::error::DispatchError;
use crate::grpc::convert::commit_to_proto;
use crate::job::Job;
use crate::proto::runner_client::RunnerClient;
use crate::proto::{HeartBeatRequest, RunJobRequest};
use crate::registry::RunnerChannel;

/// gRPC-backed runner channel. Cloning the underlying tonic client is
/// cheap; every call multiplexes over the one persistent connection the
/// handle owns.
pub struct GrpcRunnerChannel {
    client: RunnerClient<Channel>,
}

impl GrpcRunnerChannel {
    /// Open a persistent channel to a runner listening on `addr`
    /// (host:port).
    pub async fn connect(addr: &str) -> Result<Self, tonic::transport::Error> {
        let client = RunnerClient::connect(format!("http://{}", addr)).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RunnerChannel for GrpcRunnerChannel {
    async fn heart_beat(&self) -> Result<bool, DispatchError> {
        let mut client = self.client.clone();
        let reply = client
            .heart_beat(HeartBeatRequest {})
            .await
            .map_err(|s| DispatchError::RpcFailure(s.to_string()))?;
        Ok(reply.into_inner().alive)
    }

    async fn run_job(&self, job: Job) -> Result<(), DispatchError> {
        let mut client = self.client.clone();
        let request = RunJobRequest {
            commit: Some(commit_to_proto(&job.commit)),
        };
        let reply = client
            .run_job(request)
            .await
            .map_err(|s| DispatchError::RpcFailure(s.to_string()))?
            .into_inner();
        if reply.ok {
            Ok(())
        } else {
            Err(DispatchError::RpcFailure(
                reply.error.unwrap_or_else(|| "runner reported failure".to_string()),
            ))
        }
    }
}

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::runner_service::RunnerService;

/// Serve the runner RPC surface until the shutdown token fires.
pub async fn serve(
    addr: SocketAddr,
    service: RunnerService,
    shutdown: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    tracing::info!(addr = %addr, "Starting runner RPC server");
    Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(addr, shutdown.cancelled_owned())
        .await
}

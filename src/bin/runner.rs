use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use narwhal::config::RunnerConfig;
use narwhal::grpc::{self, RunnerService};
use narwhal::http::RegisterRequest;
use narwhal::shutdown::shutdown_token;
use narwhal::worker::JobExecutor;

#[derive(Parser, Debug)]
#[command(name = "runner")]
#[command(about = "CI runner: executes jobs in containers for a dispatcher")]
struct Args {
    /// Address to listen on for job RPCs
    #[arg(long, default_value = "127.0.0.1:28920")]
    addr: SocketAddr,

    /// Dispatcher registration endpoint
    #[arg(long, default_value = "http://localhost:28919/runner")]
    dispatcher: String,

    /// Root directory for job workspaces
    #[arg(long, default_value = "/tmp")]
    work_root: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = RunnerConfig {
        listen_addr: args.addr,
        dispatcher_url: args.dispatcher,
        work_root: args.work_root,
        ..RunnerConfig::default()
    };

    let executor = Arc::new(JobExecutor::new(&config));
    let service = RunnerService::new(executor);
    let shutdown = shutdown_token();

    let server = tokio::spawn(grpc::serve(config.listen_addr, service, shutdown.clone()));

    if let Err(e) = register(&config).await {
        tracing::error!(dispatcher = %config.dispatcher_url, error = %e, "Registration failed");
        std::process::exit(1);
    }
    tracing::info!(dispatcher = %config.dispatcher_url, "Registered with dispatcher");

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(addr = %config.listen_addr, error = %e, "Unable to bind runner RPC server");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Runner server task failed");
            std::process::exit(1);
        }
    }

    deregister(&config).await;
    tracing::info!("Runner stopped");
}

/// Announce this runner to the dispatcher. The dispatcher dials back over
/// RPC before accepting, so retry briefly while our listener comes up.
async fn register(config: &RunnerConfig) -> Result<(), String> {
    let client = reqwest::Client::new();
    let request = RegisterRequest {
        addr: config.listen_addr.to_string(),
    };

    let mut last_error = String::new();
    for attempt in 0..3 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        match client
            .post(&config.dispatcher_url)
            .json(&request)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => last_error = format!("dispatcher replied {}", response.status()),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(last_error)
}

/// Best-effort removal from the dispatcher's registry on shutdown.
async fn deregister(config: &RunnerConfig) {
    let client = reqwest::Client::new();
    let request = RegisterRequest {
        addr: config.listen_addr.to_string(),
    };
    if let Err(e) = client
        .delete(&config.dispatcher_url)
        .json(&request)
        .send()
        .await
    {
        tracing::warn!(error = %e, "Deregistration failed");
    }
}

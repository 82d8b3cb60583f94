use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use narwhal::config::DispatcherConfig;
use narwhal::dispatch::DispatchEngine;
use narwhal::http::{self, AppState};
use narwhal::intake::Intake;
use narwhal::registry::{heartbeat_loop, RunnerRegistry};
use narwhal::shutdown::shutdown_token;

#[derive(Parser, Debug)]
#[command(name = "dispatcher")]
#[command(about = "CI dispatcher: admits commits and forwards jobs to runners")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:28919")]
    addr: SocketAddr,

    /// Number of dispatcher tasks draining the job queue
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Job queue capacity
    #[arg(long, default_value = "64")]
    queue_capacity: usize,

    /// Heartbeat period in milliseconds
    #[arg(long, default_value = "1000")]
    heartbeat_interval_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = DispatcherConfig {
        listen_addr: args.addr,
        queue_capacity: args.queue_capacity,
        dispatch_workers: args.workers,
        heartbeat_interval: Duration::from_millis(args.heartbeat_interval_ms),
        ..DispatcherConfig::default()
    };

    tracing::info!(
        addr = %config.listen_addr,
        workers = config.dispatch_workers,
        "Starting dispatcher"
    );

    let registry = Arc::new(RunnerRegistry::new());
    let engine = Arc::new(DispatchEngine::new(registry.clone(), &config));
    let intake = Arc::new(Intake::new(engine.clone()));

    let shutdown = shutdown_token();

    engine.run(config.dispatch_workers).await;
    let heartbeat = tokio::spawn(heartbeat_loop(
        registry.clone(),
        config.heartbeat_interval,
        shutdown.clone(),
    ));

    let state = AppState { intake, registry };
    if let Err(e) = http::serve(config.listen_addr, state, shutdown.clone()).await {
        tracing::error!(addr = %config.listen_addr, error = %e, "Unable to bind dispatcher");
        std::process::exit(1);
    }

    // Drain in-flight work before exiting.
    shutdown.cancel();
    if tokio::time::timeout(config.shutdown_grace, engine.stop())
        .await
        .is_err()
    {
        tracing::warn!("Dispatcher pool did not drain in time");
    }
    let _ = heartbeat.await;
    tracing::info!("Dispatcher stopped");
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub listen_addr: SocketAddr,
    /// Bounded job queue capacity.
    pub queue_capacity: usize,
    /// Number of dispatcher tasks draining the queue.
    pub dispatch_workers: usize,
    /// Period of the runner heartbeat loop.
    pub heartbeat_interval: Duration,
    /// Hard deadline for a single RunJob RPC.
    pub job_rpc_timeout: Duration,
    /// How long shutdown waits for in-flight work to drain.
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:28919".parse().unwrap(),
            queue_capacity: 64,
            dispatch_workers: 4,
            heartbeat_interval: Duration::from_secs(1),
            job_rpc_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub listen_addr: SocketAddr,
    /// Dispatcher registration endpoint.
    pub dispatcher_url: String,
    /// Root directory for per-job clone workspaces.
    pub work_root: PathBuf,
    /// Default per-step deadline, used when the manifest carries none.
    pub step_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:28920".parse().unwrap(),
            dispatcher_url: "http://localhost:28919/runner".to_string(),
            work_root: PathBuf::from("/tmp"),
            step_timeout: Duration::from_secs(300),
        }
    }
}

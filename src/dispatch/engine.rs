use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::DispatcherConfig;
use crate::dispatch::queue::JobQueue;
use crate::error::{AdmissionError, DispatchError};
use crate::job::Job;
use crate::registry::RunnerRegistry;

/// Owns the bounded job queue and the pool of dispatcher tasks forwarding
/// jobs to live runners.
pub struct DispatchEngine {
    queue: JobQueue,
    registry: Arc<RunnerRegistry>,
    job_rpc_timeout: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchEngine {
    pub fn new(registry: Arc<RunnerRegistry>, config: &DispatcherConfig) -> Self {
        Self {
            queue: JobQueue::new(config.queue_capacity),
            registry,
            job_rpc_timeout: config.job_rpc_timeout,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Non-blocking admission into the queue.
    pub fn enqueue(&self, job: Job) -> Result<(), AdmissionError> {
        self.queue.enqueue(job)
    }

    /// Spawn `workers` dispatcher tasks draining the queue until it is
    /// closed and empty.
    pub async fn run(&self, workers: usize) {
        let Some(rx) = self.queue.take_receiver() else {
            tracing::warn!("Dispatch engine already running");
            return;
        };
        let rx = Arc::new(Mutex::new(rx));
        let mut tasks = self.tasks.lock().await;
        for worker in 0..workers {
            let rx = rx.clone();
            let registry = self.registry.clone();
            let rpc_timeout = self.job_rpc_timeout;
            tasks.push(tokio::spawn(async move {
                forwarding_loop(worker, rx, registry, rpc_timeout).await;
            }));
        }
        tracing::info!(workers, "Dispatch engine started");
    }

    /// Close the queue and wait for the dispatcher tasks to drain it.
    pub async fn stop(&self) {
        self.queue.close();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Dispatcher task panicked");
            }
        }
        tracing::info!("Dispatch engine stopped");
    }
}

async fn forwarding_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    registry: Arc<RunnerRegistry>,
    rpc_timeout: Duration,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            tracing::debug!(worker, "Job queue closed, dispatcher exiting");
            return;
        };
        if let Err(e) = dispatch_one(&job, &registry, rpc_timeout).await {
            tracing::warn!(
                worker,
                commit = %job.commit.id,
                repository = %job.commit.repository.name,
                error = %e,
                "Job dropped"
            );
        }
    }
}

/// Pick a live runner under the registry lock, then call it outside the
/// lock. Failures are the caller's to log; the job is not re-enqueued.
async fn dispatch_one(
    job: &Job,
    registry: &RunnerRegistry,
    rpc_timeout: Duration,
) -> Result<(), DispatchError> {
    let handle = registry.select_runner()?;
    tracing::debug!(
        commit = %job.commit.id,
        runner = %handle.addr(),
        "Forwarding job"
    );
    match timeout(rpc_timeout, handle.channel().run_job(job.clone())).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout),
    }
}

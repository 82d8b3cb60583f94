//! Commit intake: converts bus events into jobs, deduplicating per
//! repository against the commit store.

mod store;

pub use store::CommitStore;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dispatch::DispatchEngine;
use crate::error::AdmissionError;
use crate::job::Job;
use crate::repository::CommitEvent;

/// Pull side of the message bus. Implementations hand back raw payloads
/// until the stream ends. Delivery is at-least-once; admission filters
/// the duplicates.
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Option<Vec<u8>>;
}

/// Admission front of the dispatcher.
pub struct Intake {
    store: CommitStore,
    engine: Arc<DispatchEngine>,
}

impl Intake {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self {
            store: CommitStore::new(),
            engine,
        }
    }

    pub fn store(&self) -> &CommitStore {
        &self.store
    }

    /// Decode a raw bus payload and run it through admission.
    pub fn admit_payload(&self, payload: &[u8]) -> Result<Job, AdmissionError> {
        let event = CommitEvent::from_slice(payload)?;
        self.admit(event)
    }

    /// Admission rule: reject a commit id already recorded for its
    /// repository, otherwise enqueue a job and overwrite the store entry.
    ///
    /// The store lock is held across the enqueue so a concurrent admission
    /// of the same repository observes the updated entry. A full queue
    /// leaves the store untouched, keeping the event eligible for
    /// redelivery.
    pub fn admit(&self, event: CommitEvent) -> Result<Job, AdmissionError> {
        event.validate()?;
        let commit = event.into_commit();

        let mut repositories = self.store.guard();
        if let Some(last) = repositories.get(&commit.repository.name) {
            if last.id == commit.id {
                return Err(AdmissionError::AlreadyProcessed);
            }
        }
        let job = Job::new(commit.clone());
        self.engine.enqueue(job.clone())?;
        repositories.insert(commit.repository.name.clone(), commit);
        Ok(job)
    }

    /// Drive admission from a bus consumer until the source ends or
    /// shutdown is requested. Rejections are logged and dropped; the bus
    /// redelivers anything it considers unacknowledged.
    pub async fn consume<S: EventSource>(&self, mut source: S, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Intake consumer exiting");
                    return;
                }
                event = source.next_event() => {
                    let Some(payload) = event else {
                        tracing::info!("Event source closed");
                        return;
                    };
                    match self.admit_payload(&payload) {
                        Ok(job) => tracing::info!(
                            commit = %job.commit.id,
                            repository = %job.commit.repository.name,
                            "Commit admitted"
                        ),
                        Err(e) => tracing::warn!(error = %e, "Commit rejected"),
                    }
                }
            }
        }
    }
}

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::AdmissionError;
use crate::job::Job;

/// Bounded FIFO hand-off between intake and the dispatcher pool.
///
/// The single producer handle lives behind a mutex so `close` can drop it;
/// consumers share the receiver and drain whatever is left after closure.
pub struct JobQueue {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    rx: Mutex<Option<mpsc::Receiver<Job>>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Non-blocking send. `Backpressure` when the queue is full or closed.
    pub fn enqueue(&self, job: Job) -> Result<(), AdmissionError> {
        let guard = self.tx.lock().expect("job queue mutex poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(AdmissionError::Backpressure);
        };
        tx.try_send(job).map_err(|_| AdmissionError::Backpressure)
    }

    /// Hand the receiver to the dispatcher pool. Yields `None` after the
    /// first call.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<Job>> {
        self.rx.lock().expect("job queue mutex poisoned").take()
    }

    /// Close the queue. Jobs already queued still drain.
    pub fn close(&self) {
        self.tx.lock().expect("job queue mutex poisoned").take();
    }
}

//! Runner registry and liveness tracking. Registration opens a persistent
//! RPC channel per runner; a background loop refreshes each handle's alive
//! bit; the dispatch engine selects over the alive subset round-robin.

mod heartbeat;

pub use heartbeat::{heartbeat_loop, probe};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;

use crate::error::{DispatchError, RegistryError};
use crate::grpc::GrpcRunnerChannel;
use crate::job::Job;

/// Dispatcher-side call surface of one runner. The gRPC variant wraps a
/// connected tonic client; tests substitute in-process fakes.
#[async_trait]
pub trait RunnerChannel: Send + Sync {
    /// Single liveness probe. `Ok(true)` means the runner answered alive.
    async fn heart_beat(&self) -> Result<bool, DispatchError>;

    /// Forward a job and block until the runner reports the outcome.
    async fn run_job(&self, job: Job) -> Result<(), DispatchError>;
}

/// Local proxy to a registered runner: address, owning channel, liveness.
#[derive(Clone)]
pub struct RunnerHandle {
    addr: String,
    channel: Arc<dyn RunnerChannel>,
    alive: bool,
    last_heartbeat: Instant,
}

impl RunnerHandle {
    pub fn new(addr: impl Into<String>, channel: Arc<dyn RunnerChannel>) -> Self {
        Self {
            addr: addr.into(),
            channel,
            alive: true,
            last_heartbeat: Instant::now(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn channel(&self) -> Arc<dyn RunnerChannel> {
        self.channel.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }
}

impl std::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("addr", &self.addr)
            .field("alive", &self.alive)
            .finish()
    }
}

struct RegistryInner {
    /// Insertion order; the cursor indexes this.
    handles: Vec<RunnerHandle>,
    /// Monotone round-robin sentinel, read modulo the handle count.
    cursor: usize,
}

/// Set of registered runners plus the shared round-robin cursor, all
/// behind one mutex. Nothing awaits while holding it; RPCs happen on
/// channel clones taken out of snapshots.
pub struct RunnerRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                handles: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// Dial `addr` and insert a handle for it. The handle is not inserted
    /// when the channel cannot be opened.
    pub async fn register(&self, addr: &str) -> Result<(), RegistryError> {
        if self.contains(addr) {
            return Err(RegistryError::AlreadyRegistered(addr.to_string()));
        }
        let channel = GrpcRunnerChannel::connect(addr)
            .await
            .map_err(|e| RegistryError::Unreachable {
                addr: addr.to_string(),
                source: e,
            })?;
        self.insert(RunnerHandle::new(addr, Arc::new(channel)))
    }

    /// Insert an already-connected handle.
    pub fn insert(&self, handle: RunnerHandle) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if inner.handles.iter().any(|h| h.addr == handle.addr) {
            return Err(RegistryError::AlreadyRegistered(handle.addr));
        }
        tracing::info!(runner = %handle.addr, "Runner registered");
        inner.handles.push(handle);
        Ok(())
    }

    /// Remove the handle for `addr`; safe to call for an address that is
    /// not registered. Returns whether an entry was removed. Dropping the
    /// last clone of the handle closes its channel.
    pub fn remove(&self, addr: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.handles.len();
        inner.handles.retain(|h| h.addr != addr);
        let removed = inner.handles.len() < before;
        if removed {
            tracing::info!(runner = %addr, "Runner removed");
        }
        removed
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.lock().handles.iter().any(|h| h.addr == addr)
    }

    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().handles.is_empty()
    }

    /// Copy of the current handle set in insertion order.
    pub fn snapshot(&self) -> Vec<RunnerHandle> {
        self.lock().handles.clone()
    }

    /// Record a probe outcome for `addr`. Logged only on a flip.
    pub fn set_alive(&self, addr: &str, alive: bool) {
        let mut inner = self.lock();
        if let Some(handle) = inner.handles.iter_mut().find(|h| h.addr == addr) {
            if handle.alive != alive {
                tracing::info!(runner = %addr, alive, "Runner liveness changed");
            }
            handle.alive = alive;
            if alive {
                handle.last_heartbeat = Instant::now();
            }
        }
    }

    /// Round-robin selection over the alive subset, advancing the shared
    /// cursor past the chosen handle. The scan wraps once over the set.
    pub fn select_runner(&self) -> Result<RunnerHandle, DispatchError> {
        let mut inner = self.lock();
        if inner.handles.is_empty() {
            return Err(DispatchError::NoRunners);
        }
        let len = inner.handles.len();
        let start = inner.cursor;
        for offset in 0..len {
            let index = start.wrapping_add(offset) % len;
            if inner.handles[index].alive {
                inner.cursor = start.wrapping_add(offset).wrapping_add(1);
                return Ok(inner.handles[index].clone());
            }
        }
        Err(DispatchError::NoLiveRunners)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().expect("runner registry mutex poisoned")
    }
}

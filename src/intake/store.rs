use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::repository::Commit;

/// In-memory map of repository name to the last admitted commit. Restart
/// discards the history; nothing is persisted.
#[derive(Debug, Default)]
pub struct CommitStore {
    repositories: Mutex<HashMap<String, Commit>>,
}

impl CommitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `commit` as the last admitted one for its repository.
    pub fn put(&self, commit: Commit) {
        self.guard().insert(commit.repository.name.clone(), commit);
    }

    /// Last admitted commit for `repository`, if any.
    pub fn get(&self, repository: &str) -> Option<Commit> {
        self.guard().get(repository).cloned()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Exclusive access for multi-step admission checks. A poisoned lock
    /// means an admission path panicked, which is fatal.
    pub(crate) fn guard(&self) -> MutexGuard<'_, HashMap<String, Commit>> {
        self.repositories.lock().expect("commit store mutex poisoned")
    }
}

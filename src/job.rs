use serde::{Deserialize, Serialize};

use crate::manifest::JobSpec;
use crate::repository::Commit;

/// A unit of CI work: one admitted commit plus the manifest loaded for it.
/// The spec stays empty until the worker has the repository on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub commit: Commit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<JobSpec>,
}

impl Job {
    pub fn new(commit: Commit) -> Self {
        Self { commit, spec: None }
    }
}

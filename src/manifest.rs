use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// File the runner reads from the root of a freshly cloned repository.
pub const MANIFEST_FILE: &str = "narwhal.yml";

const DEFAULT_IMAGE: &str = "ubuntu";
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// One build step: install its dependencies, then run its command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub command: String,
}

impl Step {
    /// Shell line the step container runs. Dependencies are installed
    /// first through the image's package manager convention (apt for the
    /// ubuntu family).
    pub fn shell_command(&self) -> String {
        if self.dependencies.is_empty() {
            self.command.clone()
        } else {
            format!(
                "apt-get update && apt-get install -y {} && {}",
                self.dependencies.join(" "),
                self.command
            )
        }
    }
}

/// Parsed `narwhal.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-step deadline in seconds.
    #[serde(default = "default_step_timeout", rename = "timeout")]
    pub timeout_secs: u64,
    pub steps: Vec<Step>,
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

impl JobSpec {
    pub fn parse(raw: &str) -> Result<Self, WorkerError> {
        let spec: JobSpec =
            serde_yaml::from_str(raw).map_err(|e| WorkerError::ManifestError(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Read and parse the manifest from the root of a cloned repository.
    pub async fn load(repo_root: &Path) -> Result<Self, WorkerError> {
        let raw = tokio::fs::read_to_string(repo_root.join(MANIFEST_FILE))
            .await
            .map_err(|e| WorkerError::ManifestError(e.to_string()))?;
        Self::parse(&raw)
    }

    fn validate(&self) -> Result<(), WorkerError> {
        if self.steps.is_empty() {
            return Err(WorkerError::ManifestError("no steps declared".to_string()));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(WorkerError::ManifestError(format!(
                    "duplicate step name {}",
                    step.name
                )));
            }
        }
        Ok(())
    }
}

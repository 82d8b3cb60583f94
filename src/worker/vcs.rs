use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::WorkerError;
use crate::repository::Repository;

/// Version-control operations the executor invokes.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Clone `repository` at its branch into `dest`.
    async fn clone_repository(&self, repository: &Repository, dest: &Path)
        -> Result<(), WorkerError>;
}

/// `git` CLI-backed client.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

#[async_trait]
impl VcsClient for GitCli {
    async fn clone_repository(
        &self,
        repository: &Repository,
        dest: &Path,
    ) -> Result<(), WorkerError> {
        let argv = repository.clone_command(&dest.to_string_lossy())?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| WorkerError::Internal("empty clone command".to_string()))?;
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| WorkerError::CloneError(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(WorkerError::CloneError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

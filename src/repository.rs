use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, WorkerError};

/// Hosting service a repository lives on. Unknown values survive
/// deserialization so admission can accept them and the worker can reject
/// them at clone time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HostingService {
    GitHub,
    GitLab,
    Bitbucket,
    Unknown(String),
}

impl From<String> for HostingService {
    fn from(value: String) -> Self {
        match value.as_str() {
            "github" => HostingService::GitHub,
            "gitlab" => HostingService::GitLab,
            "bitbucket" => HostingService::Bitbucket,
            _ => HostingService::Unknown(value),
        }
    }
}

impl From<HostingService> for String {
    fn from(value: HostingService) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for HostingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostingService::GitHub => write!(f, "github"),
            HostingService::GitLab => write!(f, "gitlab"),
            HostingService::Bitbucket => write!(f, "bitbucket"),
            HostingService::Unknown(other) => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub hosting_service: HostingService,
    /// owner/repo
    pub name: String,
    pub branch: String,
}

impl Repository {
    /// Argv of the `git clone` invocation fetching this repository at its
    /// branch into `dest`.
    pub fn clone_command(&self, dest: &str) -> Result<Vec<String>, WorkerError> {
        let base = match &self.hosting_service {
            HostingService::GitHub => "https://github.com",
            HostingService::GitLab => "https://gitlab.com",
            HostingService::Bitbucket => "https://bitbucket.com",
            HostingService::Unknown(other) => {
                return Err(WorkerError::UnsupportedHost(other.clone()))
            }
        };
        Ok(vec![
            "git".to_string(),
            "clone".to_string(),
            "-b".to_string(),
            self.branch.clone(),
            format!("{}/{}", base, self.name),
            dest.to_string(),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// VCS hash.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub repository: Repository,
}

/// Raw bus payload describing a pushed commit, one per delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub repository: Repository,
}

impl CommitEvent {
    /// Decode a UTF-8 JSON payload from the bus.
    pub fn from_slice(payload: &[u8]) -> Result<Self, AdmissionError> {
        serde_json::from_slice(payload).map_err(|e| AdmissionError::MalformedEvent(e.to_string()))
    }

    /// Field-level checks the wire format cannot express.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.id.is_empty() {
            return Err(AdmissionError::MalformedEvent("empty commit id".to_string()));
        }
        if self.repository.name.is_empty() {
            return Err(AdmissionError::MalformedEvent(
                "empty repository name".to_string(),
            ));
        }
        if self.repository.branch.is_empty() {
            return Err(AdmissionError::MalformedEvent(
                "empty repository branch".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_commit(self) -> Commit {
        Commit {
            id: self.id,
            language: self.language,
            timestamp: self.timestamp,
            repository: self.repository,
        }
    }
}

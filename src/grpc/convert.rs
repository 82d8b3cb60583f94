use chrono::{DateTime, Utc};

use crate::proto;
use crate::repository::{Commit, HostingService, Repository};

pub fn commit_to_proto(commit: &Commit) -> proto::Commit {
    proto::Commit {
        id: commit.id.clone(),
        language: commit.language.clone(),
        timestamp: commit.timestamp.to_rfc3339(),
        repository: Some(proto::Repository {
            hosting_service: commit.repository.hosting_service.to_string(),
            name: commit.repository.name.clone(),
            branch: commit.repository.branch.clone(),
        }),
    }
}

pub fn commit_from_proto(commit: proto::Commit) -> Result<Commit, String> {
    let repository = commit.repository.ok_or("missing repository")?;
    let timestamp = DateTime::parse_from_rfc3339(&commit.timestamp)
        .map_err(|e| format!("bad timestamp: {}", e))?
        .with_timezone(&Utc);
    Ok(Commit {
        id: commit.id,
        language: commit.language,
        timestamp,
        repository: Repository {
            hosting_service: HostingService::from(repository.hosting_service),
            name: repository.name,
            branch: repository.branch,
        },
    })
}

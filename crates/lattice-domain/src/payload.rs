//! Commit-trigger payloads.
//!
//! A push notification names the repository and carries one or more
//! commits; the build is made from the last commit in the list.

use chrono::{DateTime, Utc};
use lattice_state::{NewBuild, RepositoryId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPayload {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<Person>,
    #[serde(default)]
    pub committer: Option<Person>,
}

/// A push event as delivered by the code host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub repository: RepositoryRef,
    #[serde(default)]
    pub commits: Vec<CommitPayload>,
}

impl PushPayload {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build parameters from the last commit. The committer falls back to
    /// the author when absent.
    pub fn build_request(&self) -> Result<BuildRequest> {
        let url = self.repository.url.trim();
        if url.is_empty() {
            return Err(DomainError::InvalidPayload(
                "repository url is empty".to_string(),
            ));
        }
        let commit = self
            .commits
            .last()
            .ok_or_else(|| DomainError::InvalidPayload("payload has no commits".to_string()))?;

        let author = commit.author.clone().unwrap_or_default();
        let committer = commit.committer.clone().unwrap_or_else(|| author.clone());

        Ok(BuildRequest {
            repository_url: url.to_string(),
            commit: commit.id.clone(),
            message: commit.message.clone(),
            committed_at: commit.timestamp,
            committer,
            author,
        })
    }
}

/// Everything needed to create a top-level build once the repository and
/// number are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub repository_url: String,
    pub commit: String,
    pub message: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
    pub committer: Person,
    pub author: Person,
}

impl BuildRequest {
    pub fn into_new_build(self, repository_id: RepositoryId, number: u64) -> NewBuild {
        NewBuild {
            number: Some(number.to_string()),
            commit: Some(self.commit),
            message: self.message,
            committed_at: self.committed_at,
            committer_name: self.committer.name,
            committer_email: self.committer.email,
            author_name: self.author.name,
            author_email: self.author.email,
            ..NewBuild::new(repository_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "repository": { "url": "http://github.com/svenfuchs/gem-release" },
        "commits": [
            {
                "id": "46ebe012ef3c0be5542a",
                "message": "Bump to 0.0.14",
                "timestamp": "2010-10-27T04:32:37Z",
                "author": { "name": "Christopher Floess", "email": "chris@flooose.de" }
            },
            {
                "id": "9854592",
                "message": "Bump to 0.0.15",
                "timestamp": "2010-10-27T04:32:37Z",
                "author": { "name": "Christopher Floess", "email": "chris@flooose.de" },
                "committer": { "name": "Sven Fuchs", "email": "svenfuchs@artweb-design.de" }
            }
        ]
    }"#;

    #[test]
    fn uses_the_last_commit() {
        let request = PushPayload::from_json(PAYLOAD).unwrap().build_request().unwrap();

        assert_eq!(request.repository_url, "http://github.com/svenfuchs/gem-release");
        assert_eq!(request.commit, "9854592");
        assert_eq!(request.message.as_deref(), Some("Bump to 0.0.15"));
        assert_eq!(request.committer.name.as_deref(), Some("Sven Fuchs"));
        assert_eq!(request.author.email.as_deref(), Some("chris@flooose.de"));
    }

    #[test]
    fn committer_defaults_to_author() {
        let mut payload = PushPayload::from_json(PAYLOAD).unwrap();
        payload.commits.truncate(1);
        let request = payload.build_request().unwrap();

        assert_eq!(request.committer, request.author);
        assert_eq!(request.committer.name.as_deref(), Some("Christopher Floess"));
    }

    #[test]
    fn missing_people_leave_fields_empty() {
        let payload: PushPayload = serde_json::from_value(serde_json::json!({
            "repository": { "url": "https://github.com/a/b" },
            "commits": [{ "id": "abc" }]
        }))
        .unwrap();
        let build = payload
            .build_request()
            .unwrap()
            .into_new_build(RepositoryId(2), 7);

        assert_eq!(build.number.as_deref(), Some("7"));
        assert_eq!(build.commit.as_deref(), Some("abc"));
        assert!(build.author_name.is_none());
        assert!(build.committer_email.is_none());
        assert!(build.status.is_none());
    }

    #[test]
    fn rejects_payload_without_commits() {
        let payload = PushPayload {
            repository: RepositoryRef {
                url: "https://github.com/a/b".into(),
            },
            commits: vec![],
        };

        assert!(matches!(
            payload.build_request(),
            Err(DomainError::InvalidPayload(_))
        ));
    }
}

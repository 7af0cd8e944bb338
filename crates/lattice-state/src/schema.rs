//! Record types for builds and repositories.
//!
//! Builds live in an arena keyed by [`BuildId`]; the parent/child relation of
//! matrix builds is a plain `parent_id` foreign key, never an embedded graph.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Build configuration: string keys mapping to scalars or lists.
///
/// Key order is insertion order, so axis order survives expansion.
pub type BuildConfig = serde_json::Map<String, serde_json::Value>;

/// Identity of a build record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub u64);

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a repository record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(pub u64);

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creation parameters for a build (everything except store-assigned fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBuild {
    pub repository_id: RepositoryId,
    /// Set by the store for matrix children; `None` for top-level builds
    pub parent_id: Option<BuildId>,
    /// Sequence number, dotted (`"12.3"`) for matrix children
    pub number: Option<String>,
    pub commit: Option<String>,
    pub message: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    /// `None` while pending, `0` passed, anything else failed
    pub status: Option<i32>,
    pub log: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config: BuildConfig,
}

impl NewBuild {
    /// Empty pending build for the given repository.
    pub fn new(repository_id: RepositoryId) -> Self {
        Self {
            repository_id,
            parent_id: None,
            number: None,
            commit: None,
            message: None,
            committed_at: None,
            committer_name: None,
            committer_email: None,
            author_name: None,
            author_email: None,
            status: None,
            log: String::new(),
            started_at: None,
            finished_at: None,
            config: BuildConfig::new(),
        }
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }
}

/// A persisted build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: BuildId,
    pub repository_id: RepositoryId,
    pub parent_id: Option<BuildId>,
    pub number: Option<String>,
    pub commit: Option<String>,
    pub message: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub status: Option<i32>,
    pub log: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config: BuildConfig,
    /// Optimistic concurrency token, bumped by the store on every write
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl BuildRecord {
    /// Materialize creation parameters into a record with a store-assigned id.
    pub fn from_new(id: BuildId, new: NewBuild, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            repository_id: new.repository_id,
            parent_id: new.parent_id,
            number: new.number,
            commit: new.commit,
            message: new.message,
            committed_at: new.committed_at,
            committer_name: new.committer_name,
            committer_email: new.committer_email,
            author_name: new.author_name,
            author_email: new.author_email,
            status: new.status,
            log: new.log,
            started_at: new.started_at,
            finished_at: new.finished_at,
            config: new.config,
            version: 1,
            created_at,
        }
    }

    /// The record's attributes as creation parameters (id, version and
    /// timestamps dropped).
    pub fn attributes(&self) -> NewBuild {
        NewBuild {
            repository_id: self.repository_id,
            parent_id: self.parent_id,
            number: self.number.clone(),
            commit: self.commit.clone(),
            message: self.message.clone(),
            committed_at: self.committed_at,
            committer_name: self.committer_name.clone(),
            committer_email: self.committer_email.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            status: self.status,
            log: self.log.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            config: self.config.clone(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The five denormalized "last build" fields a repository mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBuildSummary {
    pub build_id: BuildId,
    pub number: Option<String>,
    pub status: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl LastBuildSummary {
    pub fn from_build(build: &BuildRecord) -> Self {
        Self {
            build_id: build.id,
            number: build.number.clone(),
            status: build.status,
            started_at: build.started_at,
            finished_at: build.finished_at,
        }
    }
}

/// A persisted repository with its denormalized last-build summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: RepositoryId,
    pub url: String,
    /// `owner/name`, when the URL has a recognizable shape
    pub slug: Option<String>,
    /// Last build number handed out by `next_build_number`
    pub build_counter: u64,
    pub last_build_id: Option<BuildId>,
    pub last_build_number: Option<String>,
    pub last_build_status: Option<i32>,
    pub last_build_started_at: Option<DateTime<Utc>>,
    pub last_build_finished_at: Option<DateTime<Utc>>,
}

impl RepositoryRecord {
    pub fn new(id: RepositoryId, url: &str) -> Self {
        Self {
            id,
            url: url.to_string(),
            slug: Self::slug_from_url(url),
            build_counter: 0,
            last_build_id: None,
            last_build_number: None,
            last_build_status: None,
            last_build_started_at: None,
            last_build_finished_at: None,
        }
    }

    /// Extract `owner/name` from an http(s), git or scp-style remote URL.
    pub fn slug_from_url(url: &str) -> Option<String> {
        static SLUG: OnceLock<Regex> = OnceLock::new();
        let re = SLUG.get_or_init(|| {
            Regex::new(r"^(?:[a-z+]+://)?(?:[^@/]+@)?[^/:]+[/:]([^/]+)/([^/]+?)(?:\.git)?/?$")
                .expect("slug pattern is valid")
        });
        let caps = re.captures(url.trim())?;
        Some(format!("{}/{}", &caps[1], &caps[2]))
    }

    /// Overwrite the denormalized fields with `summary`.
    pub fn apply_summary(&mut self, summary: &LastBuildSummary) {
        self.last_build_id = Some(summary.build_id);
        self.last_build_number = summary.number.clone();
        self.last_build_status = summary.status;
        self.last_build_started_at = summary.started_at;
        self.last_build_finished_at = summary.finished_at;
    }

    /// Current denormalized summary, if one has been written.
    pub fn last_build(&self) -> Option<LastBuildSummary> {
        self.last_build_id.map(|build_id| LastBuildSummary {
            build_id,
            number: self.last_build_number.clone(),
            status: self.last_build_status,
            started_at: self.last_build_started_at,
            finished_at: self.last_build_finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_common_url_shapes() {
        assert_eq!(
            RepositoryRecord::slug_from_url("http://github.com/svenfuchs/minimal").as_deref(),
            Some("svenfuchs/minimal")
        );
        assert_eq!(
            RepositoryRecord::slug_from_url("https://github.com/travis-ci/travis-ci.git").as_deref(),
            Some("travis-ci/travis-ci")
        );
        assert_eq!(
            RepositoryRecord::slug_from_url("git@github.com:josevalim/enginex.git").as_deref(),
            Some("josevalim/enginex")
        );
        assert_eq!(RepositoryRecord::slug_from_url("not a url"), None);
    }

    #[test]
    fn attributes_round_trip_through_from_new() {
        let mut config = BuildConfig::new();
        config.insert("rvm".into(), serde_json::json!(["1.9.2"]));
        let new = NewBuild::new(RepositoryId(3))
            .with_number("7")
            .with_config(config);
        let record = BuildRecord::from_new(BuildId(11), new.clone(), Utc::now());

        assert_eq!(record.version, 1);
        assert!(record.is_top_level());
        assert_eq!(record.attributes(), new);
    }

    #[test]
    fn apply_summary_overwrites_all_fields() {
        let mut repo = RepositoryRecord::new(RepositoryId(1), "https://github.com/a/b");
        let summary = LastBuildSummary {
            build_id: BuildId(4),
            number: Some("2".into()),
            status: Some(1),
            started_at: Some(Utc::now()),
            finished_at: None,
        };
        repo.apply_summary(&summary);

        assert_eq!(repo.last_build(), Some(summary));
    }
}

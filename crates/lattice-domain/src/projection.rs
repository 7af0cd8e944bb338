//! Named JSON projections of builds and repositories.
//!
//! Each view selects a fixed field set. A matrix build additionally embeds
//! its children projected under `build:started`, whatever the view.

use std::str::FromStr;

use lattice_state::{BuildRecord, RepositoryRecord};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DomainError, Result};

const BUILD_ALL: &[&str] = &[
    "id",
    "repository_id",
    "parent_id",
    "number",
    "commit",
    "message",
    "status",
    "log",
    "started_at",
    "committed_at",
    "committer_name",
    "committer_email",
    "author_name",
    "author_email",
    "config",
];

const BUILD_STARTED: &[&str] = &[
    "id",
    "repository_id",
    "parent_id",
    "number",
    "commit",
    "message",
    "started_at",
    "committed_at",
    "committer_name",
    "committer_email",
    "author_name",
    "author_email",
    "config",
];

const REPOSITORY_SUMMARY: &[&str] = &[
    "id",
    "slug",
    "url",
    "last_build_id",
    "last_build_number",
    "last_build_status",
    "last_build_started_at",
    "last_build_finished_at",
];

const REPOSITORY_BRIEF: &[&str] = &["id", "slug"];

/// Projection selector, named by the `for` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum View {
    #[default]
    Default,
    Job,
    BuildQueued,
    BuildStarted,
    BuildLog,
    BuildFinished,
}

impl View {
    pub const ALL: [View; 6] = [
        View::Default,
        View::Job,
        View::BuildQueued,
        View::BuildStarted,
        View::BuildLog,
        View::BuildFinished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Default => "default",
            View::Job => "job",
            View::BuildQueued => "build:queued",
            View::BuildStarted => "build:started",
            View::BuildLog => "build:log",
            View::BuildFinished => "build:finished",
        }
    }

    pub fn build_fields(&self) -> &'static [&'static str] {
        match self {
            View::Default => BUILD_ALL,
            View::Job => &["id", "commit", "config"],
            View::BuildQueued => &["id", "number"],
            View::BuildStarted => BUILD_STARTED,
            View::BuildLog => &["id"],
            View::BuildFinished => &["id", "status", "finished_at"],
        }
    }

    pub fn repository_fields(&self) -> &'static [&'static str] {
        match self {
            View::Default | View::BuildStarted | View::BuildFinished => REPOSITORY_SUMMARY,
            View::Job | View::BuildQueued | View::BuildLog => REPOSITORY_BRIEF,
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        View::ALL
            .into_iter()
            .find(|view| view.as_str() == s)
            .ok_or_else(|| DomainError::UnknownView(s.to_string()))
    }
}

fn select<T: Serialize>(record: &T, fields: &[&str]) -> Result<Value> {
    let Value::Object(mut all) = serde_json::to_value(record)? else {
        return Ok(Value::Object(Map::new()));
    };
    let mut selected = Map::new();
    for field in fields {
        if let Some(value) = all.remove(*field) {
            selected.insert((*field).to_string(), value);
        }
    }
    Ok(Value::Object(selected))
}

/// Project a build. Pass `Some(children)` for a matrix build to embed them.
pub fn project_build(
    build: &BuildRecord,
    view: View,
    matrix: Option<&[BuildRecord]>,
) -> Result<Value> {
    let mut json = select(build, view.build_fields())?;
    if let (Some(children), Value::Object(map)) = (matrix, &mut json) {
        let projected = children
            .iter()
            .map(|child| select(child, View::BuildStarted.build_fields()))
            .collect::<Result<Vec<_>>>()?;
        map.insert("matrix".to_string(), Value::Array(projected));
    }
    Ok(json)
}

/// Project a repository.
pub fn project_repository(repository: &RepositoryRecord, view: View) -> Result<Value> {
    select(repository, view.repository_fields())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lattice_state::{BuildId, NewBuild, RepositoryId};
    use serde_json::json;

    fn build(id: u64, number: &str) -> BuildRecord {
        let mut new = NewBuild::new(RepositoryId(1)).with_number(number);
        new.commit = Some("62aae5f70ceee39123ef".into());
        new.log = "$ rake".into();
        new.status = Some(0);
        BuildRecord::from_new(BuildId(id), new, Utc::now())
    }

    fn keys(value: &Value) -> Vec<String> {
        value.as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn view_names_round_trip() {
        for view in View::ALL {
            assert_eq!(view.as_str().parse::<View>().unwrap(), view);
        }
        assert!(matches!(
            "build:exploded".parse::<View>(),
            Err(DomainError::UnknownView(_))
        ));
    }

    #[test]
    fn default_view_has_all_build_fields_in_order() {
        let json = project_build(&build(1, "1"), View::Default, None).unwrap();

        assert_eq!(keys(&json), BUILD_ALL);
        assert!(json.get("finished_at").is_none());
        assert!(json.get("version").is_none());
    }

    #[test]
    fn started_view_drops_status_and_log() {
        let json = project_build(&build(1, "1"), View::BuildStarted, None).unwrap();

        assert!(json.get("status").is_none());
        assert!(json.get("log").is_none());
        assert_eq!(json["commit"], json!("62aae5f70ceee39123ef"));
    }

    #[test]
    fn narrow_views() {
        let b = build(4, "2");

        assert_eq!(
            project_build(&b, View::BuildLog, None).unwrap(),
            json!({"id": 4})
        );
        assert_eq!(
            project_build(&b, View::BuildQueued, None).unwrap(),
            json!({"id": 4, "number": "2"})
        );
        assert_eq!(
            project_build(&b, View::BuildFinished, None).unwrap(),
            json!({"id": 4, "status": 0, "finished_at": null})
        );
        assert_eq!(keys(&project_build(&b, View::Job, None).unwrap()), ["id", "commit", "config"]);
    }

    #[test]
    fn matrix_children_are_embedded_as_started() {
        let parent = build(1, "1");
        let children = vec![build(2, "1.1"), build(3, "1.2")];
        let json = project_build(&parent, View::BuildFinished, Some(&children)).unwrap();

        let matrix = json["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[1]["number"], json!("1.2"));
        assert!(matrix[0].get("log").is_none());
    }

    #[test]
    fn repository_views() {
        let repo = RepositoryRecord::new(RepositoryId(5), "https://github.com/svenfuchs/minimal");

        assert_eq!(
            project_repository(&repo, View::BuildLog).unwrap(),
            json!({"id": 5, "slug": "svenfuchs/minimal"})
        );
        let started = project_repository(&repo, View::BuildStarted).unwrap();
        assert_eq!(keys(&started), REPOSITORY_SUMMARY);
        assert_eq!(started["last_build_id"], Value::Null);
    }
}

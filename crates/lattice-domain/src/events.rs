//! Build notifications.
//!
//! At most one notification is emitted per save. Selection priority is
//! started, then log, then finished; the first flag that holds wins.

use lattice_state::{BuildRecord, RepositoryRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::lifecycle::{LogAppend, Transition};
use crate::projection::{project_build, project_repository, View};

/// Which build event a save announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "build:started")]
    Started,
    #[serde(rename = "build:log")]
    Log,
    #[serde(rename = "build:finished")]
    Finished,
}

impl NotificationKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            NotificationKind::Started => "build:started",
            NotificationKind::Log => "build:log",
            NotificationKind::Finished => "build:finished",
        }
    }

    /// Projection used for the build and repository in the payload.
    pub fn view(&self) -> View {
        match self {
            NotificationKind::Started => View::BuildStarted,
            NotificationKind::Log => View::BuildLog,
            NotificationKind::Finished => View::BuildFinished,
        }
    }

    pub fn select(transition: &Transition) -> Option<Self> {
        if transition.was_started {
            Some(NotificationKind::Started)
        } else if transition.log_appended.is_some() {
            Some(NotificationKind::Log)
        } else if transition.was_finished {
            Some(NotificationKind::Finished)
        } else {
            None
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// A notification ready for publishing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub payload: Value,
}

impl Notification {
    /// Assemble the payload for `kind`. `log` is only read for
    /// `build:log`; `matrix` embeds children for matrix builds.
    pub fn build(
        kind: NotificationKind,
        build: &BuildRecord,
        matrix: Option<&[BuildRecord]>,
        repository: &RepositoryRecord,
        log: Option<&LogAppend>,
    ) -> Result<Self> {
        let view = kind.view();
        let mut payload = json!({
            "build": project_build(build, view, matrix)?,
            "repository": project_repository(repository, view)?,
        });
        if let (NotificationKind::Log, Some(log), Value::Object(map)) = (kind, log, &mut payload) {
            map.insert("log".to_string(), Value::String(log.chars.clone()));
            map.insert("msg_id".to_string(), Value::String(log.msg_id.clone()));
        }
        Ok(Self { kind, payload })
    }

    pub fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }
}

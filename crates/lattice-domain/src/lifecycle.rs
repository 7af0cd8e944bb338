//! Build lifecycle predicates and per-save transition detection.
//!
//! There is no stored state enum: every predicate is re-derived from the
//! build's current fields, and transitions are found by comparing the
//! record before and after a save.

use lattice_state::BuildRecord;
use serde::{Deserialize, Serialize};

use crate::axes::MatrixAxes;

/// Lifecycle position derived from timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    Started,
    Finished,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Pending => write!(f, "pending"),
            LifecycleState::Started => write!(f, "started"),
            LifecycleState::Finished => write!(f, "finished"),
        }
    }
}

/// Derived lifecycle predicates for a build.
pub trait BuildLifecycle {
    fn is_started(&self) -> bool;

    fn is_finished(&self) -> bool;

    /// Not yet finished. A started build is still pending.
    fn is_pending(&self) -> bool {
        !self.is_finished()
    }

    /// Status is exactly `0`.
    fn passed(&self) -> bool;

    /// `""` while pending, then `"green"` or `"red"`.
    fn color(&self) -> &'static str {
        if self.is_pending() {
            ""
        } else if self.passed() {
            "green"
        } else {
            "red"
        }
    }

    fn state(&self) -> LifecycleState {
        if self.is_finished() {
            LifecycleState::Finished
        } else if self.is_started() {
            LifecycleState::Started
        } else {
            LifecycleState::Pending
        }
    }
}

impl BuildLifecycle for BuildRecord {
    fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    fn passed(&self) -> bool {
        self.status == Some(0)
    }
}

/// Fields that differ between the prior snapshot and the saved record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub number: bool,
    pub status: bool,
    pub started_at: bool,
    pub finished_at: bool,
    pub config: bool,
    pub log: bool,
}

impl ChangeSet {
    /// Compare snapshots. With no prior snapshot (a create), every field
    /// holding a value counts as changed.
    pub fn between(before: Option<&BuildRecord>, after: &BuildRecord) -> Self {
        match before {
            Some(before) => Self {
                number: before.number != after.number,
                status: before.status != after.status,
                started_at: before.started_at != after.started_at,
                finished_at: before.finished_at != after.finished_at,
                config: before.config != after.config,
                log: before.log != after.log,
            },
            None => Self {
                number: after.number.is_some(),
                status: after.status.is_some(),
                started_at: after.started_at.is_some(),
                finished_at: after.finished_at.is_some(),
                config: !after.config.is_empty(),
                log: !after.log.is_empty(),
            },
        }
    }

    /// Whether any field mirrored by the repository summary changed.
    pub fn touches_summary(&self) -> bool {
        self.number || self.status || self.started_at || self.finished_at
    }
}

/// Text appended by an append-log save, with its message correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAppend {
    pub chars: String,
    pub msg_id: String,
}

/// Transition flags for one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub changes: ChangeSet,
    /// Started now, and `started_at` changed in this save
    pub was_started: bool,
    /// Finished now, and `finished_at` changed in this save
    pub was_finished: bool,
    /// Only set for the save performed by an append-log operation
    pub log_appended: Option<LogAppend>,
    /// The config changed in this save and now describes a matrix
    pub matrix_expanded: bool,
}

impl Transition {
    /// Classify a save. `axes` must be extracted from `after.config`.
    pub fn detect(
        before: Option<&BuildRecord>,
        after: &BuildRecord,
        log_appended: Option<LogAppend>,
        axes: &MatrixAxes,
    ) -> Self {
        let changes = ChangeSet::between(before, after);
        Self {
            was_started: after.is_started() && changes.started_at,
            was_finished: after.is_finished() && changes.finished_at,
            matrix_expanded: changes.config && axes.is_matrix(),
            log_appended,
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axes::AxisVocabulary;
    use chrono::{Duration, Utc};
    use lattice_state::{BuildId, NewBuild, RepositoryId};
    use serde_json::json;

    fn build() -> BuildRecord {
        BuildRecord::from_new(
            BuildId(1),
            NewBuild::new(RepositoryId(1)).with_number("1"),
            Utc::now(),
        )
    }

    fn no_axes() -> MatrixAxes {
        MatrixAxes::extract(&Default::default(), &AxisVocabulary::default())
    }

    #[test]
    fn passed_only_for_exact_zero() {
        let mut b = build();
        b.finished_at = Some(Utc::now());

        for (status, passed, color) in [
            (Some(0), true, "green"),
            (Some(1), false, "red"),
            (Some(-1), false, "red"),
            (None, false, "red"),
        ] {
            b.status = status;
            assert_eq!(b.passed(), passed, "status {status:?}");
            assert_eq!(b.color(), color, "status {status:?}");
        }
    }

    #[test]
    fn color_is_blank_until_finished() {
        let mut b = build();
        b.status = Some(0);
        assert_eq!(b.color(), "");

        b.started_at = Some(Utc::now());
        assert!(b.is_pending());
        assert_eq!(b.color(), "");
        assert_eq!(b.state(), LifecycleState::Started);

        b.finished_at = Some(Utc::now());
        assert_eq!(b.color(), "green");
        assert_eq!(b.state(), LifecycleState::Finished);
    }

    #[test]
    fn create_counts_populated_fields_as_changed() {
        let changes = ChangeSet::between(None, &build());

        assert!(changes.number);
        assert!(!changes.status);
        assert!(!changes.log);
        assert!(changes.touches_summary());
    }

    #[test]
    fn was_started_only_on_the_starting_save() {
        let before = build();
        let mut started = before.clone();
        started.started_at = Some(Utc::now());

        let first = Transition::detect(Some(&before), &started, None, &no_axes());
        assert!(first.was_started);

        let mut logged = started.clone();
        logged.log.push_str("$ rake\n");
        let second = Transition::detect(Some(&started), &logged, None, &no_axes());
        assert!(!second.was_started);
        assert!(second.changes.log);
        assert!(!second.changes.touches_summary());
    }

    #[test]
    fn was_finished_when_finished_at_moves() {
        let mut before = build();
        before.started_at = Some(Utc::now());
        let mut after = before.clone();
        after.finished_at = Some(Utc::now());
        after.status = Some(1);

        let t = Transition::detect(Some(&before), &after, None, &no_axes());
        assert!(t.was_finished);
        assert!(!t.was_started);

        let mut later = after.clone();
        later.finished_at = after.finished_at.map(|at| at + Duration::seconds(5));
        assert!(Transition::detect(Some(&after), &later, None, &no_axes()).was_finished);
    }

    #[test]
    fn matrix_expanded_is_an_explicit_check() {
        let before = build();
        let mut after = before.clone();
        after
            .config
            .insert("rvm".into(), json!(["1.8.7", "1.9.2"]));
        let axes = MatrixAxes::extract(&after.config, &AxisVocabulary::default());

        assert!(Transition::detect(Some(&before), &after, None, &axes).matrix_expanded);
        assert!(!Transition::detect(Some(&after), &after, None, &axes).matrix_expanded);
    }
}

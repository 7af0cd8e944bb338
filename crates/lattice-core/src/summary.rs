//! Repository last-build summary synchronization.

use std::sync::Arc;

use lattice_domain::ChangeSet;
use lattice_state::{BuildRecord, LastBuildSummary, RepositoryStore};

use crate::error::{LatticeError, Result};
use crate::obs;

/// Mirrors a build's summary fields onto its repository.
///
/// Only the repository's current last build (its newest top-level build)
/// is mirrored, and only when a summary field changed in the save.
#[derive(Clone)]
pub struct RepositorySummarySync {
    repositories: Arc<dyn RepositoryStore>,
}

impl RepositorySummarySync {
    pub fn new(repositories: Arc<dyn RepositoryStore>) -> Self {
        Self { repositories }
    }

    /// Returns whether the repository was written. A storage failure is
    /// reported as [`LatticeError::SummarySync`].
    pub async fn sync(&self, build: &BuildRecord, changes: &ChangeSet) -> Result<bool> {
        if !changes.touches_summary() {
            return Ok(false);
        }

        let wrap = |source| LatticeError::SummarySync {
            build_id: build.id,
            source,
        };

        let current = self
            .repositories
            .last_build_id(build.repository_id)
            .await
            .map_err(wrap)?;
        if current != Some(build.id) {
            return Ok(false);
        }

        self.repositories
            .update_last_build(build.repository_id, LastBuildSummary::from_build(build))
            .await
            .map_err(wrap)?;

        obs::emit_summary_synced(build.id, build.repository_id);
        Ok(true)
    }
}

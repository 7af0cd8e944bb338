//! Storage trait definitions for Lattice
//!
//! These traits define the storage collaborators the build pipeline talks to:
//! - `RepositoryStore`: repositories, their build counters and last-build summary
//! - `BuildStore`: build records and the matrix parent/child relation
//!
//! All traits are async and backend-agnostic. An in-memory arena
//! implementation lives in the `memory` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{BuildId, BuildRecord, LastBuildSummary, NewBuild, RepositoryId, RepositoryRecord};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Repository persistence.
///
/// Guarantees:
/// - `find_or_create_repository` returns the same record for the same URL.
/// - `next_build_number` returns the repository's build count (matrix
///   children included) plus one, computed atomically. Numbers handed out
///   but not yet used are counted too, so concurrent callers never
///   observe the same number.
/// - `last_build_id` is the newest top-level build of the repository.
/// - `update_last_build` writes all five summary fields in one step.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Look a repository up by URL, creating it when absent.
    async fn find_or_create_repository(&self, url: &str) -> StorageResult<RepositoryRecord>;

    /// Fetch a repository. Returns `StorageError::RepositoryNotFound` if absent.
    async fn get_repository(&self, id: RepositoryId) -> StorageResult<RepositoryRecord>;

    /// Reserve the next build number for a repository.
    async fn next_build_number(&self, id: RepositoryId) -> StorageResult<u64>;

    /// Identity of the repository's current last build, if it has any builds.
    async fn last_build_id(&self, id: RepositoryId) -> StorageResult<Option<BuildId>>;

    /// Overwrite the repository's denormalized last-build fields.
    async fn update_last_build(
        &self,
        id: RepositoryId,
        summary: LastBuildSummary,
    ) -> StorageResult<()>;
}

/// Build persistence.
///
/// Guarantees:
/// - Each write of one build is atomic, including any children passed with it.
/// - `update_build` rejects stale snapshots with `StorageError::VersionConflict`
///   and bumps `version` on success.
/// - Children are only inserted for a parent with no children; otherwise the
///   whole write fails with `StorageError::MatrixAlreadyExpanded`.
/// - `children` returns builds in creation order.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Insert a build, and its matrix children if any, as one write.
    async fn create_build(
        &self,
        build: NewBuild,
        matrix: Vec<NewBuild>,
    ) -> StorageResult<BuildRecord>;

    /// Fetch a build. Returns `StorageError::BuildNotFound` if absent.
    async fn get_build(&self, id: BuildId) -> StorageResult<BuildRecord>;

    /// Persist a mutated build, and its matrix children if any, as one write.
    async fn update_build(
        &self,
        build: &BuildRecord,
        matrix: Vec<NewBuild>,
    ) -> StorageResult<BuildRecord>;

    /// Matrix children of a build, in creation order.
    async fn children(&self, parent: BuildId) -> StorageResult<Vec<BuildRecord>>;

    /// Number of builds (top-level and children) owned by a repository.
    async fn count_builds_for_repository(&self, id: RepositoryId) -> StorageResult<u64>;
}

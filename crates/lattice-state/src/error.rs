//! Error types for lattice-state

use thiserror::Error;

use crate::schema::{BuildId, RepositoryId};

/// Errors raised by build and repository stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Build lookup failed
    #[error("build not found: {id}")]
    BuildNotFound { id: BuildId },

    /// Repository lookup failed
    #[error("repository not found: {id}")]
    RepositoryNotFound { id: RepositoryId },

    /// A build was written against a repository that does not exist.
    /// Nothing is persisted when this is returned.
    #[error("build must belong to an existing repository (repository {id} is missing)")]
    RepositoryRequired { id: RepositoryId },

    /// The caller's snapshot is stale
    #[error("version conflict on build {id}: expected {expected}, found {found}")]
    VersionConflict {
        id: BuildId,
        expected: u64,
        found: u64,
    },

    /// Children were offered for a parent that already has some
    #[error("build {id} already has matrix children")]
    MatrixAlreadyExpanded { id: BuildId },

    /// Backend failure (lock poisoning, I/O, driver errors)
    #[error("storage backend error: {0}")]
    Backend(String),
}

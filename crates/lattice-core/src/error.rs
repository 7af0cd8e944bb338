//! Error taxonomy for the build pipeline.

use lattice_domain::DomainError;
use lattice_state::{BuildId, StorageError};

/// Errors surfaced to callers of the build pipeline.
///
/// Notification delivery failures are not represented here. They are logged
/// by the dispatcher and never fail a save.
#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("repository summary sync failed for build {build_id}: {source}")]
    SummarySync {
        build_id: BuildId,
        #[source]
        source: StorageError,
    },

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("build {build_id} still conflicting after {attempts} write attempts")]
    WriteContention { build_id: BuildId, attempts: u32 },
}

/// Result type for build pipeline operations.
pub type Result<T> = std::result::Result<T, LatticeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_sync_error_keeps_source() {
        let err = LatticeError::SummarySync {
            build_id: BuildId(3),
            source: StorageError::Backend("disk full".into()),
        };

        assert!(err.to_string().contains("build 3"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn storage_errors_convert() {
        let err: LatticeError = StorageError::BuildNotFound { id: BuildId(1) }.into();
        assert!(matches!(err, LatticeError::Storage(_)));
    }
}

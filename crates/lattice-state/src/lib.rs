//! Lattice-State: build and repository persistence for Lattice
//!
//! This crate owns the records the build pipeline reads and writes and the
//! storage traits it talks through.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: per-record atomicity, optimistic versioning, arena-style ownership.
//!
//! ## Key Components
//!
//! - `BuildRecord` / `NewBuild`: a CI build and its creation parameters
//! - `RepositoryRecord`: a repository with its denormalized last-build summary
//! - `BuildStore` / `RepositoryStore`: async storage collaborators
//! - `MemoryStore`: in-memory arena implementing both traits

mod error;
pub mod memory;
mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use schema::{
    BuildConfig, BuildId, BuildRecord, LastBuildSummary, NewBuild, RepositoryId,
    RepositoryRecord,
};
pub use storage_traits::{BuildStore, RepositoryStore, StorageResult};

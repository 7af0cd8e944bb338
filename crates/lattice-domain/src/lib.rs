//! Lattice Build Domain Model
//!
//! Pure, synchronous building blocks of the build pipeline:
//! - MatrixAxes: which config keys are matrix axes, and the matrix width
//! - expand: recursive product over axis levels into concrete rows
//! - factory: rows into child-build creation parameters (`"{parent}.{n}"`)
//! - BuildLifecycle / Transition: derived predicates and per-save transition flags
//! - View: named JSON projections of builds and repositories
//! - NotificationKind / Notification: which event a save announces, and its payload
//! - PushPayload: commit-trigger payloads into build parameters
//!
//! Nothing here performs I/O; persistence and publishing live in `lattice-core`.

pub mod axes;
pub mod error;
pub mod events;
pub mod expand;
pub mod factory;
pub mod lifecycle;
pub mod payload;
pub mod projection;

pub use axes::{Axis, AxisVocabulary, MatrixAxes, DEFAULT_AXIS_KEYS};
pub use error::{DomainError, Result};
pub use events::{Notification, NotificationKind};
pub use expand::{expand, Cell, Row};
pub use factory::{child_build, child_builds, child_number, row_config};
pub use lifecycle::{BuildLifecycle, ChangeSet, LifecycleState, LogAppend, Transition};
pub use payload::{BuildRequest, CommitPayload, Person, PushPayload, RepositoryRef};
pub use projection::{project_build, project_repository, View};

/// Lattice domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

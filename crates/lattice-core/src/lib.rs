//! Lattice Core Library
//!
//! The build save pipeline and its side effects: matrix expansion on save,
//! repository summary sync, and build notifications over pub/sub.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod obs;
pub mod publisher;
pub mod service;
pub mod summary;

pub use config::{LatticeConfig, MatrixSection, NotificationSettings, StorageSection};
pub use dispatch::{DispatchOutcome, NotificationDispatcher};
pub use error::{LatticeError, Result};
pub use publisher::{
    LogPublisher, MemoryPublisher, PublishError, Published, Publisher, WebhookPublisher,
};
pub use service::{BuildService, BuildUpdate, SaveOutcome};
pub use summary::RepositorySummarySync;

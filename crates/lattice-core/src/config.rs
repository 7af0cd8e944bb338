//! Lattice configuration.
//!
//! Reads `lattice.toml`. Every section and field has a default, so an empty
//! file (or no file at all) is a valid configuration.
//!
//! ```toml
//! [matrix]
//! axis_keys = ["rvm", "gemfile", "env"]
//!
//! [notifications]
//! channel = "repositories"
//! timeout_ms = 2000
//! max_attempts = 3
//! backoff_base_ms = 100
//! webhook_url = "https://hooks.example/lattice"
//!
//! [storage]
//! max_write_attempts = 5
//! ```
//!
//! `LATTICE_WEBHOOK_URL` and `LATTICE_NOTIFY_CHANNEL` override the file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use lattice_domain::AxisVocabulary;
use serde::{Deserialize, Serialize};

/// Matrix expansion settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixSection {
    /// Config keys treated as matrix axes, in row key order
    pub axis_keys: AxisVocabulary,
}

/// Notification delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Pub/sub channel every build event is published on
    pub channel: String,
    /// Wall-clock limit for a single publish attempt (milliseconds)
    pub timeout_ms: u64,
    /// Total publish attempts before the notification is dropped
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts (milliseconds)
    pub backoff_base_ms: u64,
    /// Deliver over HTTP to this endpoint when set
    pub webhook_url: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            channel: "repositories".to_string(),
            timeout_ms: 2_000,
            max_attempts: 3,
            backoff_base_ms: 100,
            webhook_url: None,
        }
    }
}

impl NotificationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Storage interaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Attempts for a read-modify-write of one build before giving up on
    /// version conflicts
    pub max_write_attempts: u32,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            max_write_attempts: 5,
        }
    }
}

/// Root of `lattice.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    pub matrix: MatrixSection,
    pub notifications: NotificationSettings,
    pub storage: StorageSection,
}

impl LatticeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse lattice.toml")
    }

    /// Load `path` if it exists, otherwise defaults. Environment overrides
    /// are applied either way.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Apply `LATTICE_WEBHOOK_URL` and `LATTICE_NOTIFY_CHANNEL`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("LATTICE_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(channel) = std::env::var("LATTICE_NOTIFY_CHANNEL") {
            if !channel.is_empty() {
                self.notifications.channel = channel;
            }
        }
        self
    }
}

//! Structured observability hooks for build lifecycle events.
//!
//! This module provides:
//! - Build-scoped tracing spans via the `BuildSpan` RAII guard
//! - Emission functions for the pipeline's key events: creation, matrix
//!   expansion, lifecycle transitions, summary sync and notification delivery
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `--json` to the `lattice` binary.

use lattice_state::{BuildId, RepositoryId};
use tracing::{info, warn};

/// RAII guard that enters a build-scoped tracing span.
///
/// ```ignore
/// let _span = BuildSpan::enter(build.id);
/// // every tracing call below is tagged with build_id
/// ```
pub struct BuildSpan {
    _span: tracing::span::EnteredSpan,
}

impl BuildSpan {
    pub fn enter(build_id: BuildId) -> Self {
        Self {
            _span: build_span(build_id).entered(),
        }
    }
}

/// The span behind [`BuildSpan`], for attaching to futures with
/// `tracing::Instrument` (an entered guard must not be held across `.await`).
pub fn build_span(build_id: BuildId) -> tracing::Span {
    tracing::info_span!("lattice.build", build_id = %build_id)
}

pub fn emit_build_created(build_id: BuildId, number: Option<&str>, repository_id: RepositoryId) {
    info!(
        event = "build.created",
        build_id = %build_id,
        number = number.unwrap_or_default(),
        repository_id = %repository_id,
    );
}

/// Emit event: a matrix parent was persisted together with its children.
pub fn emit_matrix_expanded(build_id: BuildId, width: usize, axes: &[String]) {
    info!(
        event = "build.matrix_expanded",
        build_id = %build_id,
        width = width,
        axes = %axes.join(","),
    );
}

pub fn emit_build_started(build_id: BuildId) {
    info!(event = "build.started", build_id = %build_id);
}

pub fn emit_build_finished(build_id: BuildId, status: Option<i32>, color: &str) {
    info!(
        event = "build.finished",
        build_id = %build_id,
        status = status.unwrap_or(-1),
        color = %color,
    );
}

pub fn emit_log_appended(build_id: BuildId, chars: usize, msg_id: &str) {
    tracing::debug!(
        event = "build.log_appended",
        build_id = %build_id,
        chars = chars,
        msg_id = %msg_id,
    );
}

pub fn emit_summary_synced(build_id: BuildId, repository_id: RepositoryId) {
    info!(
        event = "repository.summary_synced",
        build_id = %build_id,
        repository_id = %repository_id,
    );
}

pub fn emit_notification_delivered(build_id: BuildId, name: &str, attempts: u32) {
    info!(
        event = "notification.delivered",
        build_id = %build_id,
        name = %name,
        attempts = attempts,
    );
}

/// Emit event: one delivery attempt failed and will be retried (warning level).
pub fn emit_notification_retry(build_id: BuildId, name: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "notification.retry",
        build_id = %build_id,
        name = %name,
        attempt = attempt,
        error = %error,
    );
}

/// Emit event: notification abandoned after exhausting its attempts (warning level).
pub fn emit_notification_dropped(build_id: BuildId, name: &str, attempts: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "notification.dropped",
        build_id = %build_id,
        name = %name,
        attempts = attempts,
        error = %error,
    );
}

/// Emit event: a save lost a version race and is being retried (warning level).
pub fn emit_write_conflict(build_id: BuildId, attempt: u32) {
    warn!(event = "build.write_conflict", build_id = %build_id, attempt = attempt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_span_create() {
        let _span = BuildSpan::enter(BuildId(12));
        emit_build_started(BuildId(12));
        emit_notification_dropped(BuildId(12), "build:started", 3, &"refused");
    }
}

//! Notification delivery: timeout, retry with exponential backoff.
//!
//! Delivery failures never propagate. A notification that cannot be
//! delivered within its attempts is logged and reported as
//! [`DispatchOutcome::Dropped`]; the save that produced it stands.

use std::sync::Arc;

use lattice_domain::Notification;
use lattice_state::BuildId;
use serde::Serialize;

use crate::config::NotificationSettings;
use crate::obs;
use crate::publisher::{PublishError, Publisher};

/// What happened to the notification of one save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The save had nothing to announce.
    Skipped,
    Delivered { event: String, attempts: u32 },
    Dropped {
        event: String,
        attempts: u32,
        error: String,
    },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Publishes notifications on the configured channel.
#[derive(Clone)]
pub struct NotificationDispatcher {
    publisher: Arc<dyn Publisher>,
    settings: NotificationSettings,
}

impl NotificationDispatcher {
    pub fn new(publisher: Arc<dyn Publisher>, settings: NotificationSettings) -> Self {
        Self {
            publisher,
            settings,
        }
    }

    /// Deliver `notification`, or give up after `max_attempts`.
    pub async fn dispatch(&self, build_id: BuildId, notification: &Notification) -> DispatchOutcome {
        let event = notification.event_name();
        let max_attempts = self.settings.max_attempts.max(1);

        let mut last_error = PublishError::Transport("no attempt made".to_string());
        for attempt in 1..=max_attempts {
            match self.attempt(event, &notification.payload).await {
                Ok(()) => {
                    obs::emit_notification_delivered(build_id, event, attempt);
                    return DispatchOutcome::Delivered {
                        event: event.to_string(),
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    if attempt < max_attempts {
                        obs::emit_notification_retry(build_id, event, attempt, &err);
                        tokio::time::sleep(self.settings.backoff(attempt)).await;
                    }
                    last_error = err;
                }
            }
        }

        obs::emit_notification_dropped(build_id, event, max_attempts, &last_error);
        DispatchOutcome::Dropped {
            event: event.to_string(),
            attempts: max_attempts,
            error: last_error.to_string(),
        }
    }

    async fn attempt(&self, event: &str, payload: &serde_json::Value) -> Result<(), PublishError> {
        let publish = self.publisher.publish(&self.settings.channel, event, payload);
        match tokio::time::timeout(self.settings.timeout(), publish).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PublishError::Timeout {
                timeout_ms: self.settings.timeout_ms,
            }),
        }
    }
}

//! Pub/sub transports for build notifications.
//!
//! A [`Publisher`] delivers one `(channel, event, payload)` message. Retry,
//! timeouts and backoff are the dispatcher's job, not the transport's.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

/// Errors a transport can report for a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint rejected notification with status {status}")]
    Rejected { status: u16 },

    #[error("publish timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Delivers notifications to a pub/sub channel.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, payload: &Value)
        -> Result<(), PublishError>;
}

/// A message captured by [`MemoryPublisher`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Published {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// Records every publish in order. Used by the CLI's dry runs and by tests.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    sent: Mutex<Vec<Published>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published so far, oldest first.
    pub fn published(&self) -> Vec<Published> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.published().into_iter().map(|p| p.event).collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), PublishError> {
        let message = Published {
            channel: channel.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}

/// Writes each notification to the tracing log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), PublishError> {
        info!(
            event = "notification.logged",
            channel = %channel,
            name = %event,
            payload = %payload,
        );
        Ok(())
    }
}

/// POSTs `{"channel", "event", "data"}` to a webhook endpoint.
pub struct WebhookPublisher {
    endpoint: String,
    http_client: reqwest::Client,
}

impl WebhookPublisher {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, PublishError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("lattice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    fn body(channel: &str, event: &str, payload: &Value) -> Value {
        json!({
            "channel": channel,
            "event": event,
            "data": payload,
        })
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), PublishError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&Self::body(channel, event, payload))
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PublishError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

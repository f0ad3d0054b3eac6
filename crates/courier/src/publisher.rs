use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::{Channel, NotificationEvent};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to send notification: {0}")]
    Send(String),
}

/// Keyed, best-effort write to the outbound topic.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), PublishError>;

    /// Wait for queued messages to leave the process.
    async fn flush(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Notification Publisher
///
/// Wraps every request in a [`NotificationEvent`] with a fresh id and writes it
/// to the sink keyed by that id. One attempt per call: no retry, buffering or
/// batching happens here.
pub struct Publisher {
    sink: Arc<dyn MessageSink>,
}

impl Publisher {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Publish a notification request, returning the id it was published under.
    pub async fn send_event(
        &self,
        channel: Channel,
        template: &str,
        to: &str,
        data: Map<String, Value>,
    ) -> Result<String, PublishError> {
        let event = NotificationEvent {
            id: Uuid::new_v4().to_string(),
            channel,
            template: template.to_string(),
            to: to.to_string(),
            data,
        };

        let payload = serde_json::to_vec(&event)?;
        self.sink.send(event.id.as_bytes(), &payload).await?;

        tracing::debug!(id = %event.id, channel = %channel, template = %template, "notification sent");
        Ok(event.id)
    }

    pub async fn flush(&self) -> Result<(), PublishError> {
        self.sink.flush().await
    }
}

//! Publishing payloads to JetStream subjects.

use crate::error::NatsError;
use async_nats::jetstream::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Completion callback for [`Publisher::publish_async`]; receives the stream
/// sequence on success.
pub type AckHandler = Box<dyn FnOnce(Result<u64, NatsError>) + Send + 'static>;

/// Sends payloads to a named subject.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish and wait for the broker ack. Returns the stream sequence.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64, NatsError>;

    /// Publish without waiting. The ack (or failure) is reported to `on_ack`
    /// from a background task. Returns a local id for log correlation.
    fn publish_async(
        &self,
        subject: &str,
        payload: Vec<u8>,
        on_ack: AckHandler,
    ) -> Result<String, NatsError>;
}

/// [`Publisher`] backed by a JetStream context.
#[derive(Clone)]
pub struct JetStreamPublisher {
    jetstream: Arc<Context>,
}

impl JetStreamPublisher {
    pub fn new(jetstream: Context) -> Self {
        Self {
            jetstream: Arc::new(jetstream),
        }
    }

    async fn send(jetstream: &Context, subject: String, payload: Vec<u8>) -> Result<u64, NatsError> {
        let ack = jetstream
            .publish(subject, payload.into())
            .await
            .map_err(|e| NatsError::publish_error(e.to_string()))?
            .await
            .map_err(|e| NatsError::publish_error(e.to_string()))?;

        Ok(ack.sequence)
    }
}

fn validate_subject(subject: &str) -> Result<(), NatsError> {
    if subject.trim().is_empty() {
        return Err(NatsError::Config("subject must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Publisher for JetStreamPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64, NatsError> {
        validate_subject(subject)?;
        let bytes = payload.len();
        let sequence = Self::send(&self.jetstream, subject.to_string(), payload).await?;

        debug!(subject = %subject, sequence, bytes, "Published message");
        Ok(sequence)
    }

    fn publish_async(
        &self,
        subject: &str,
        payload: Vec<u8>,
        on_ack: AckHandler,
    ) -> Result<String, NatsError> {
        validate_subject(subject)?;

        let id = uuid::Uuid::new_v4().to_string();
        let jetstream = self.jetstream.clone();
        let subject = subject.to_string();
        let publish_id = id.clone();

        tokio::spawn(async move {
            let result = Self::send(&jetstream, subject.clone(), payload).await;
            match &result {
                Ok(sequence) => {
                    debug!(subject = %subject, publish_id = %publish_id, sequence, "Async publish acked")
                }
                Err(e) => {
                    warn!(subject = %subject, publish_id = %publish_id, error = %e, "Async publish failed")
                }
            }
            on_ack(result);
        });

        Ok(id)
    }
}

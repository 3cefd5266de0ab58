//! Inbound message envelope and the acknowledgement handle that travels with it.

use crate::error::NatsError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Broker-owned delivery state of one message, detached from the live connection.
///
/// Redelivery decisions only ever look at these fields, so they can be tested
/// without a running server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Routing key the message was published on
    pub subject: String,
    /// Stream sequence assigned by the broker
    pub sequence: u64,
    /// Raw payload bytes (JSON)
    pub payload: Vec<u8>,
    /// How many times the broker has redelivered this message (0 on first delivery)
    pub redelivery_count: u32,
    /// Whether this is a redelivery
    pub redelivered: bool,
    /// When the broker stored the message
    pub timestamp: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Envelope for a first delivery.
    pub fn new(
        subject: impl Into<String>,
        sequence: u64,
        payload: impl Into<Vec<u8>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: subject.into(),
            sequence,
            payload: payload.into(),
            redelivery_count: 0,
            redelivered: false,
            timestamp,
        }
    }

    /// Set the delivery state from the broker's delivery counter (1 = first delivery).
    pub fn with_deliveries(mut self, delivered: u32) -> Self {
        let delivered = delivered.max(1);
        self.redelivery_count = delivered - 1;
        self.redelivered = delivered > 1;
        self
    }

    /// Build an envelope from a JetStream message.
    pub(crate) fn from_jetstream(message: &async_nats::jetstream::Message) -> Self {
        let (sequence, delivered, timestamp) = match message.info() {
            Ok(info) => {
                let nanos = info.published.unix_timestamp_nanos();
                let timestamp = i64::try_from(nanos)
                    .map(DateTime::<Utc>::from_timestamp_nanos)
                    .unwrap_or_else(|_| Utc::now());
                let delivered = u32::try_from(info.delivered).unwrap_or(u32::MAX);
                (info.stream_sequence, delivered, timestamp)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get message info, treating as first delivery");
                (0, 1, Utc::now())
            }
        };

        Self::new(
            message.subject.to_string(),
            sequence,
            message.payload.to_vec(),
            timestamp,
        )
        .with_deliveries(delivered)
    }
}

/// Acknowledges a message back to the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), NatsError>;

    /// Restart the broker's ack-wait timer without acking.
    async fn in_progress(&self) -> Result<(), NatsError> {
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for async_nats::jetstream::Message {
    async fn ack(&self) -> Result<(), NatsError> {
        async_nats::jetstream::Message::ack(self)
            .await
            .map_err(|e| NatsError::consumer_error(e.to_string()))
    }

    async fn in_progress(&self) -> Result<(), NatsError> {
        self.ack_with(async_nats::jetstream::AckKind::Progress)
            .await
            .map_err(|e| NatsError::consumer_error(e.to_string()))
    }
}

/// A delivered message: its envelope plus the means to ack it.
///
/// Dropping an `InboundMessage` without calling [`InboundMessage::ack`] leaves
/// it pending; the broker redelivers it once the ack-wait window expires.
pub struct InboundMessage {
    envelope: MessageEnvelope,
    acker: Box<dyn Acknowledger>,
}

impl InboundMessage {
    pub fn new(envelope: MessageEnvelope, acker: impl Acknowledger + 'static) -> Self {
        Self {
            envelope,
            acker: Box::new(acker),
        }
    }

    pub fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }

    /// Tell the broker work on the message has started, restarting its ack-wait window.
    pub async fn in_progress(&self) -> Result<(), NatsError> {
        self.acker.in_progress().await
    }

    /// Acknowledge the message. Consumes it so a message is acked at most once.
    pub async fn ack(self) -> Result<(), NatsError> {
        self.acker.ack().await
    }
}

impl From<async_nats::jetstream::Message> for InboundMessage {
    fn from(message: async_nats::jetstream::Message) -> Self {
        let envelope = MessageEnvelope::from_jetstream(&message);
        Self::new(envelope, message)
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("subject", &self.envelope.subject)
            .field("sequence", &self.envelope.sequence)
            .field("redelivery_count", &self.envelope.redelivery_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delivery() {
        let envelope = MessageEnvelope::new("mail:create", 7, b"{}".to_vec(), Utc::now());
        assert_eq!(envelope.redelivery_count, 0);
        assert!(!envelope.redelivered);
    }

    #[test]
    fn test_with_deliveries() {
        let envelope =
            MessageEnvelope::new("mail:send", 1, Vec::new(), Utc::now()).with_deliveries(5);
        assert_eq!(envelope.redelivery_count, 4);
        assert!(envelope.redelivered);

        // A zero counter is clamped to a first delivery
        let envelope =
            MessageEnvelope::new("mail:send", 1, Vec::new(), Utc::now()).with_deliveries(0);
        assert_eq!(envelope.redelivery_count, 0);
        assert!(!envelope.redelivered);
    }
}

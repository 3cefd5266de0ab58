//! Dead-letter routing for messages the pipeline has given up on.

use crate::envelope::{InboundMessage, MessageEnvelope};
use crate::metrics::MetricsRecorder;
use crate::publisher::Publisher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Failure evidence published to the dead-letter subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub subject: String,
    pub sequence: u64,
    /// Original payload, lossily decoded as UTF-8
    pub payload: String,
    /// When the broker stored the original message
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub captured_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn capture(envelope: &MessageEnvelope, error: impl Into<String>) -> Self {
        Self {
            subject: envelope.subject.clone(),
            sequence: envelope.sequence,
            payload: String::from_utf8_lossy(&envelope.payload).into_owned(),
            timestamp: envelope.timestamp,
            error: error.into(),
            captured_at: Utc::now(),
        }
    }
}

/// Whether a failed message has been redelivered often enough to give up on it.
///
/// Pure function of broker-reported envelope state: the message must be a
/// redelivery and its redelivery count must exceed `threshold`.
pub fn should_dead_letter(envelope: &MessageEnvelope, threshold: u32) -> bool {
    envelope.redelivered && envelope.redelivery_count > threshold
}

/// What happened to a failed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Published to the dead-letter subject and acked
    DeadLettered,
    /// Published to the dead-letter subject but the ack failed; the broker
    /// may redeliver it
    AckFailed,
    /// Under the threshold; left unacked for normal redelivery
    PendingRedelivery,
    /// Dead-letter publish failed; left unacked so the evidence is not lost
    PublishFailed,
}

/// Publishes [`DeadLetterRecord`]s and acks the originals.
pub struct DeadLetterRouter {
    publisher: Arc<dyn Publisher>,
    subject: String,
    threshold: u32,
    metrics: Arc<dyn MetricsRecorder>,
}

impl DeadLetterRouter {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        subject: impl Into<String>,
        threshold: u32,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            publisher,
            subject: subject.into(),
            threshold,
            metrics,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Route a message whose retries were exhausted.
    pub async fn route(&self, message: InboundMessage, error: &str) -> RouteOutcome {
        let envelope = message.envelope();
        if !should_dead_letter(envelope, self.threshold) {
            debug!(
                subject = %envelope.subject,
                sequence = envelope.sequence,
                redelivery_count = envelope.redelivery_count,
                threshold = self.threshold,
                "Leaving message for redelivery"
            );
            return RouteOutcome::PendingRedelivery;
        }

        self.dead_letter(message, error).await
    }

    /// Dead-letter a message unconditionally (used for payloads that can never succeed).
    pub async fn dead_letter(&self, message: InboundMessage, error: &str) -> RouteOutcome {
        let record = DeadLetterRecord::capture(message.envelope(), error);

        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize dead-letter record");
                return RouteOutcome::PublishFailed;
            }
        };

        if let Err(e) = self.publisher.publish(&self.subject, payload).await {
            error!(
                subject = %record.subject,
                sequence = record.sequence,
                error = %e,
                "Dead-letter publish failed, leaving message unacked"
            );
            return RouteOutcome::PublishFailed;
        }

        self.metrics.message_dead_lettered(&record.subject);
        info!(
            subject = %record.subject,
            sequence = record.sequence,
            dead_letter_subject = %self.subject,
            error = %record.error,
            "Message dead-lettered"
        );

        match message.ack().await {
            Ok(()) => RouteOutcome::DeadLettered,
            Err(e) => {
                error!(
                    subject = %record.subject,
                    sequence = record.sequence,
                    error = %e,
                    "Ack after dead-letter failed"
                );
                RouteOutcome::AckFailed
            }
        }
    }
}

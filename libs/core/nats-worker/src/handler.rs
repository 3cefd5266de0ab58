//! Per-message acknowledgement protocol.
//!
//! ```text
//! decode ──fail──▶ dead-letter now, ack
//!   │
//!   ▼
//! retry(process) ──ok──▶ ack
//!   │
//!   ├─permanent error──▶ dead-letter now, ack
//!   ├─cancelled──▶ leave unacked
//!   ▼
//! exhausted ──▶ DeadLetterRouter (dead-letter + ack, or leave for redelivery)
//! ```

use crate::dlq::{DeadLetterRouter, RouteOutcome};
use crate::envelope::InboundMessage;
use crate::error::ErrorCategory;
use crate::metrics::MetricsRecorder;
use crate::retry::{RetryError, RetryExecutor};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback run by every worker of a pool for each delivered message.
///
/// Implementations own the ack: a message that is dropped without
/// [`InboundMessage::ack`] is redelivered by the broker.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: InboundMessage);
}

/// Business logic for one decoded message.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Decoded payload type.
    type Job: DeserializeOwned + Send + Sync;
    type Error: Display + Send + Sync;

    /// Processor name (for logging).
    fn name(&self) -> &'static str;

    async fn process(&self, job: &Self::Job) -> Result<(), Self::Error>;

    /// Permanent errors skip the remaining attempts and go straight to the
    /// dead-letter subject.
    fn classify(&self, _error: &Self::Error) -> ErrorCategory {
        ErrorCategory::Transient
    }
}

/// Final state of one message after handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    AckFailed,
    Cancelled,
    Routed(RouteOutcome),
}

/// [`MessageHandler`] that decodes JSON, runs a [`Processor`] under a
/// [`RetryExecutor`], then acks or hands the message to a [`DeadLetterRouter`].
pub struct RetryingHandler<P: Processor> {
    processor: Arc<P>,
    retry: RetryExecutor,
    router: Arc<DeadLetterRouter>,
    metrics: Arc<dyn MetricsRecorder>,
    cancel: CancellationToken,
}

impl<P: Processor> RetryingHandler<P> {
    pub fn new(
        processor: Arc<P>,
        retry: RetryExecutor,
        router: Arc<DeadLetterRouter>,
        metrics: Arc<dyn MetricsRecorder>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            processor,
            retry,
            router,
            metrics,
            cancel,
        }
    }

    /// Run the full protocol for one message and report what happened.
    pub async fn process_message(&self, message: InboundMessage) -> Disposition {
        let envelope = message.envelope();
        let subject = envelope.subject.clone();
        let sequence = envelope.sequence;

        self.metrics.message_received(&subject);
        debug!(
            processor = self.processor.name(),
            subject = %subject,
            sequence,
            redelivery_count = envelope.redelivery_count,
            "Processing message"
        );

        let job: P::Job = match serde_json::from_slice(&envelope.payload) {
            Ok(job) => job,
            Err(e) => {
                self.metrics.message_failed(&subject);
                warn!(
                    processor = self.processor.name(),
                    subject = %subject,
                    sequence,
                    error = %e,
                    "Malformed payload, dead-lettering without retry"
                );
                let reason = format!("malformed payload: {e}");
                return Disposition::Routed(self.router.dead_letter(message, &reason).await);
            }
        };

        let mut calls = 0u32;
        let result = self
            .retry
            .run_while(
                &self.cancel,
                || {
                    calls += 1;
                    self.processor.process(&job)
                },
                |e| self.processor.classify(e) == ErrorCategory::Transient,
            )
            .await;

        if calls > 1 {
            self.metrics.retry_attempted(&subject, calls - 1);
        }

        match result {
            Ok(()) => match message.ack().await {
                Ok(()) => {
                    self.metrics.message_succeeded(&subject);
                    debug!(subject = %subject, sequence, attempts = calls, "Message acked");
                    Disposition::Acked
                }
                Err(e) => {
                    error!(subject = %subject, sequence, error = %e, "Ack failed");
                    Disposition::AckFailed
                }
            },
            Err(RetryError::Cancelled { attempts, .. }) => {
                info!(
                    subject = %subject,
                    sequence,
                    attempts,
                    "Processing cancelled, leaving message for redelivery"
                );
                Disposition::Cancelled
            }
            Err(RetryError::Aborted { attempts, source }) => {
                self.metrics.message_failed(&subject);
                warn!(
                    processor = self.processor.name(),
                    subject = %subject,
                    sequence,
                    attempts,
                    error = %source,
                    "Permanent failure, dead-lettering without retry"
                );
                let reason = format!("permanent failure: {source}");
                Disposition::Routed(self.router.dead_letter(message, &reason).await)
            }
            Err(RetryError::Exhausted { attempts, source }) => {
                self.metrics.message_failed(&subject);
                error!(
                    processor = self.processor.name(),
                    subject = %subject,
                    sequence,
                    attempts,
                    error = %source,
                    "Processing failed after retries"
                );
                Disposition::Routed(self.router.route(message, &source.to_string()).await)
            }
        }
    }
}

#[async_trait]
impl<P: Processor> MessageHandler for RetryingHandler<P> {
    async fn handle(&self, message: InboundMessage) {
        self.process_message(message).await;
    }
}

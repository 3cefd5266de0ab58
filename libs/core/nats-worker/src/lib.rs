//! NATS JetStream queue-group workers with bounded retry and dead-letter routing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────────┐     ┌──────────────────────┐
//! │ JetStreamPublisher│────▶│   NATS JetStream    │────▶│  WorkerPool (N tasks) │
//! └──────────────────┘     │ durable per q-group │     │  one durable consumer │
//!                          └─────────────────────┘     └──────────┬───────────┘
//!                                                                 ▼
//!                                                      ┌──────────────────────┐
//!                                                      │   RetryingHandler    │
//!                                                      │ decode → retry → ack │
//!                                                      └──────────┬───────────┘
//!                                                                 ▼ exhausted
//!                                                      ┌──────────────────────┐
//!                                                      │  DeadLetterRouter    │
//!                                                      └──────────────────────┘
//! ```
//!
//! Delivery is at-least-once: a message is acked only after its processor
//! succeeded or after its failure record was published to the dead-letter
//! subject. Anything else is left for the broker to redeliver.
//!
//! # Example
//!
//! ```rust,ignore
//! let pool = WorkerPool::new(jetstream, SubscriptionConfig::default());
//! let handler = Arc::new(RetryingHandler::new(processor, retry, router, metrics, cancel.clone()));
//! let subscription = pool.subscribe("mail:send", "email_service", 6, handler, cancel);
//! subscription.wait().await;
//! ```

mod config;
mod consumer;
mod dlq;
mod envelope;
mod error;
mod handler;
mod health;
pub mod metrics;
mod pool;
mod publisher;
mod retry;
pub mod testing;

pub use config::{durable_name, StreamSpec, SubscriptionConfig};
pub use consumer::{bind_consumer, ensure_stream, JetStreamSource, MessageSource, MessageStream};
pub use dlq::{should_dead_letter, DeadLetterRecord, DeadLetterRouter, RouteOutcome};
pub use envelope::{Acknowledger, InboundMessage, MessageEnvelope};
pub use error::{ErrorCategory, NatsError};
pub use handler::{Disposition, MessageHandler, Processor, RetryingHandler};
pub use health::{HealthServer, HealthState, HealthStatus};
pub use metrics::{init_metrics, MetricsRecorder, NoopRecorder, PrometheusRecorder};
pub use pool::{Subscription, WorkerPool};
pub use publisher::{AckHandler, JetStreamPublisher, Publisher};
pub use retry::{RetryError, RetryExecutor};

pub use tokio_util::sync::CancellationToken;

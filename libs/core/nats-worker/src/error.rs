//! Error types for the NATS worker layer.

use std::fmt;
use thiserror::Error;

/// Whether a failed message is worth another attempt.
///
/// - **Transient**: broker hiccup, store unreachable, SMTP connect failure
/// - **Permanent**: the message itself is bad; it is dead-lettered without retry
///
/// See [`crate::Processor::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Permanent => write!(f, "permanent"),
        }
    }
}

/// Error that can occur in NATS worker operations.
#[derive(Debug, Error)]
pub enum NatsError {
    /// JetStream error (stream/consumer management, fetch)
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// Consumer error (ack)
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NatsError {
    /// Get the error category for retry decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            NatsError::Serialization(_) | NatsError::Config(_) => ErrorCategory::Permanent,
            _ => ErrorCategory::Transient,
        }
    }

    /// Create a JetStream error from an async_nats error.
    pub fn from_jetstream_error(error: impl fmt::Display) -> Self {
        Self::JetStream(error.to_string())
    }

    /// Create a publish error.
    pub fn publish_error(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Create a consumer error.
    pub fn consumer_error(msg: impl Into<String>) -> Self {
        Self::Consumer(msg.into())
    }
}

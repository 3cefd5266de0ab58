use nats_worker::{ErrorCategory, NatsError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Email not found: {0}")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] NatsError),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

pub type MailResult<T> = Result<T, MailError>;

impl MailError {
    /// A bad address or an unreadable record fails the same way on every
    /// attempt; everything else may succeed later.
    pub fn category(&self) -> ErrorCategory {
        match self {
            MailError::InvalidAddress(_) | MailError::Serialization(_) => ErrorCategory::Permanent,
            MailError::Broker(e) => e.category(),
            _ => ErrorCategory::Transient,
        }
    }
}

impl From<sea_orm::DbErr> for MailError {
    fn from(err: sea_orm::DbErr) -> Self {
        MailError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for MailError {
    fn from(err: redis::RedisError) -> Self {
        MailError::Cache(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailError::Smtp(err.to_string())
    }
}

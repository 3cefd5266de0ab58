use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MailResult;
use crate::models::{Email, NewEmail, Pagination};

/// Durable store for email records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailRepository: Send + Sync {
    /// Insert a record; the store assigns its id and creation time.
    async fn create(&self, input: NewEmail) -> MailResult<Email>;

    /// Fetch one record. Missing rows are [`crate::MailError::NotFound`].
    async fn get_by_id(&self, id: Uuid) -> MailResult<Email>;

    /// Count records matching a full-text query.
    async fn count_search(&self, text: &str) -> MailResult<u64>;

    /// One window of records matching a full-text query, newest first.
    async fn search(&self, text: &str, pagination: Pagination) -> MailResult<Vec<Email>>;
}

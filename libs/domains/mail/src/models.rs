use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted email record.
///
/// Identity and creation time are assigned by the repository on insert; the
/// record never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    #[serde(rename = "emailID")]
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Email as submitted by a producer, before it has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
}

impl NewEmail {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// Page-based window over search results. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub size: u64,
}

impl Pagination {
    pub const DEFAULT_SIZE: u64 = 10;

    /// Build a window, clamping page and size to at least 1.
    pub fn new(page: u64, size: u64) -> Self {
        Self {
            page: page.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> u64 {
        self.size
    }

    pub fn total_pages(&self, total_count: u64) -> u64 {
        if self.size == 0 {
            return 0;
        }
        total_count.div_ceil(self.size)
    }

    pub fn has_more(&self, total_count: u64) -> bool {
        total_count > self.page.saturating_mul(self.size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            size: Self::DEFAULT_SIZE,
        }
    }
}

/// One page of search results, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailsPage {
    pub total_count: u64,
    pub total_pages: u64,
    pub page: u64,
    pub size: u64,
    pub has_more: bool,
    pub emails: Vec<Email>,
}

impl EmailsPage {
    pub fn empty(pagination: Pagination) -> Self {
        Self {
            total_count: 0,
            total_pages: 0,
            page: pagination.page,
            size: pagination.size,
            has_more: false,
            emails: Vec::new(),
        }
    }

    pub fn new(pagination: Pagination, total_count: u64, emails: Vec<Email>) -> Self {
        Self {
            total_count,
            total_pages: pagination.total_pages(total_count),
            page: pagination.page,
            size: pagination.size,
            has_more: pagination.has_more(total_count),
            emails,
        }
    }
}

/// Message handed to the SMTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailData {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub content: String,
}

impl From<&Email> for MailData {
    fn from(email: &Email) -> Self {
        Self {
            from: email.from.clone(),
            to: email.to.clone(),
            subject: email.subject.clone(),
            content: email.message.clone(),
        }
    }
}

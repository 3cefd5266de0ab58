use nats_worker::{MetricsRecorder, Publisher};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::cache::EmailCache;
use crate::error::MailResult;
use crate::models::{Email, EmailsPage, MailData, NewEmail, Pagination};
use crate::repository::EmailRepository;
use crate::smtp::SmtpClient;
use crate::subjects::{CREATE_SUBJECT, SEND_SUBJECT};

/// Sequences repository, cache, broker and SMTP calls for the email pipeline.
pub struct EmailUseCase<R, C, P, S>
where
    R: EmailRepository,
    C: EmailCache,
    P: Publisher,
    S: SmtpClient,
{
    repository: Arc<R>,
    cache: Arc<C>,
    publisher: Arc<P>,
    smtp: Arc<S>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<R, C, P, S> Clone for EmailUseCase<R, C, P, S>
where
    R: EmailRepository,
    C: EmailCache,
    P: Publisher,
    S: SmtpClient,
{
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            cache: self.cache.clone(),
            publisher: self.publisher.clone(),
            smtp: self.smtp.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<R, C, P, S> EmailUseCase<R, C, P, S>
where
    R: EmailRepository,
    C: EmailCache,
    P: Publisher,
    S: SmtpClient,
{
    pub fn new(
        repository: R,
        cache: C,
        publisher: Arc<P>,
        smtp: S,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            repository: Arc::new(repository),
            cache: Arc::new(cache),
            publisher,
            smtp: Arc::new(smtp),
            metrics,
        }
    }

    fn observe<T>(&self, operation: &'static str, started: Instant, result: &MailResult<T>) {
        self.metrics
            .operation_duration(operation, started.elapsed(), result.is_ok());
    }

    /// Hand a new email to the create workers. Returns the stream sequence.
    #[instrument(skip(self, email), fields(to = %email.to))]
    pub async fn publish_create(&self, email: &NewEmail) -> MailResult<u64> {
        let started = Instant::now();
        let result: MailResult<u64> = async {
            let payload = serde_json::to_vec(email)?;
            Ok(self.publisher.publish(CREATE_SUBJECT, payload).await?)
        }
        .await;
        self.observe("publish_create", started, &result);
        result
    }

    /// Persist an email, then queue the stored record for delivery.
    ///
    /// A failed publish after a successful insert fails the call; the caller's
    /// retry then inserts again (see DESIGN.md on duplicate inserts).
    #[instrument(skip(self, email), fields(to = %email.to))]
    pub async fn create(&self, email: NewEmail) -> MailResult<Email> {
        let started = Instant::now();
        let result: MailResult<Email> = async {
            let stored = self.repository.create(email).await?;
            let payload = serde_json::to_vec(&stored)?;
            let sequence = self.publisher.publish(SEND_SUBJECT, payload).await?;
            debug!(email_id = %stored.id, sequence, "Queued email for delivery");
            Ok(stored)
        }
        .await;
        self.observe("create", started, &result);
        result
    }

    /// Deliver a stored email over SMTP. Errors propagate unchanged.
    #[instrument(skip(self, email), fields(email_id = %email.id))]
    pub async fn send_email(&self, email: &Email) -> MailResult<()> {
        let started = Instant::now();
        let result = self.smtp.send_mail(&MailData::from(email)).await;
        self.observe("send_email", started, &result);
        result
    }

    /// Cache-aside read: cache errors count as misses and write-back is best-effort.
    #[instrument(skip(self), fields(email_id = %id))]
    pub async fn get_by_id(&self, id: Uuid) -> MailResult<Email> {
        let started = Instant::now();

        match self.cache.get_email(id).await {
            Ok(Some(email)) => {
                let result = Ok(email);
                self.observe("get_by_id", started, &result);
                return result;
            }
            Ok(None) => {}
            Err(e) => warn!(email_id = %id, error = %e, "Cache read failed, falling back to repository"),
        }

        let result = self.repository.get_by_id(id).await;
        if let Ok(email) = &result {
            if let Err(e) = self.cache.set_email(email).await {
                warn!(email_id = %id, error = %e, "Cache write failed");
            }
        }

        self.observe("get_by_id", started, &result);
        result
    }

    /// Full-text search, newest first. A zero count skips the window query.
    #[instrument(skip(self), fields(page = pagination.page, size = pagination.size))]
    pub async fn search(&self, text: &str, pagination: Pagination) -> MailResult<EmailsPage> {
        let started = Instant::now();
        let result: MailResult<EmailsPage> = async {
            let total_count = self.repository.count_search(text).await?;
            if total_count == 0 {
                return Ok(EmailsPage::empty(pagination));
            }

            let emails = self.repository.search(text, pagination).await?;
            Ok(EmailsPage::new(pagination, total_count, emails))
        }
        .await;
        self.observe("search", started, &result);
        result
    }
}

//! Worker pools consuming `mail:create` and `mail:send`.

use async_trait::async_trait;
use nats_worker::{
    CancellationToken, DeadLetterRouter, ErrorCategory, MetricsRecorder, Processor, Publisher,
    RetryingHandler, Subscription, WorkerPool,
};
use std::sync::Arc;
use tracing::info;

use crate::cache::EmailCache;
use crate::config::PipelineConfig;
use crate::error::MailError;
use crate::models::{Email, NewEmail};
use crate::repository::EmailRepository;
use crate::smtp::SmtpClient;
use crate::subjects::{CREATE_SUBJECT, ERRORS_SUBJECT, SEND_SUBJECT};
use crate::usecase::EmailUseCase;

/// Stores submitted emails and queues them for delivery.
pub struct CreateEmailProcessor<R, C, P, S>
where
    R: EmailRepository,
    C: EmailCache,
    P: Publisher,
    S: SmtpClient,
{
    usecase: EmailUseCase<R, C, P, S>,
}

#[async_trait]
impl<R, C, P, S> Processor for CreateEmailProcessor<R, C, P, S>
where
    R: EmailRepository + 'static,
    C: EmailCache + 'static,
    P: Publisher + 'static,
    S: SmtpClient + 'static,
{
    type Job = NewEmail;
    type Error = MailError;

    fn name(&self) -> &'static str {
        "create_email"
    }

    async fn process(&self, job: &NewEmail) -> Result<(), MailError> {
        self.usecase.create(job.clone()).await.map(|_| ())
    }

    fn classify(&self, error: &MailError) -> ErrorCategory {
        error.category()
    }
}

/// Delivers stored emails over SMTP.
pub struct SendEmailProcessor<R, C, P, S>
where
    R: EmailRepository,
    C: EmailCache,
    P: Publisher,
    S: SmtpClient,
{
    usecase: EmailUseCase<R, C, P, S>,
}

#[async_trait]
impl<R, C, P, S> Processor for SendEmailProcessor<R, C, P, S>
where
    R: EmailRepository + 'static,
    C: EmailCache + 'static,
    P: Publisher + 'static,
    S: SmtpClient + 'static,
{
    type Job = Email;
    type Error = MailError;

    fn name(&self) -> &'static str {
        "send_email"
    }

    async fn process(&self, job: &Email) -> Result<(), MailError> {
        self.usecase.send_email(job).await
    }

    fn classify(&self, error: &MailError) -> ErrorCategory {
        error.category()
    }
}

/// Handlers for both subjects, sharing one dead-letter router.
pub struct EmailHandlers<R, C, P, S>
where
    R: EmailRepository + 'static,
    C: EmailCache + 'static,
    P: Publisher + 'static,
    S: SmtpClient + 'static,
{
    pub create: Arc<RetryingHandler<CreateEmailProcessor<R, C, P, S>>>,
    pub send: Arc<RetryingHandler<SendEmailProcessor<R, C, P, S>>>,
}

impl<R, C, P, S> EmailHandlers<R, C, P, S>
where
    R: EmailRepository + 'static,
    C: EmailCache + 'static,
    P: Publisher + 'static,
    S: SmtpClient + 'static,
{
    pub fn new(
        usecase: EmailUseCase<R, C, P, S>,
        publisher: Arc<P>,
        metrics: Arc<dyn MetricsRecorder>,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let router = Arc::new(DeadLetterRouter::new(
            publisher,
            ERRORS_SUBJECT,
            config.max_redelivery,
            metrics.clone(),
        ));

        let create = RetryingHandler::new(
            Arc::new(CreateEmailProcessor {
                usecase: usecase.clone(),
            }),
            config.retry(),
            router.clone(),
            metrics.clone(),
            cancel.clone(),
        );
        let send = RetryingHandler::new(
            Arc::new(SendEmailProcessor { usecase }),
            config.retry(),
            router,
            metrics,
            cancel,
        );

        Self {
            create: Arc::new(create),
            send: Arc::new(send),
        }
    }
}

/// Runs the create and send worker pools.
pub struct EmailSubscriber<R, C, P, S>
where
    R: EmailRepository + 'static,
    C: EmailCache + 'static,
    P: Publisher + 'static,
    S: SmtpClient + 'static,
{
    pool: WorkerPool,
    config: PipelineConfig,
    usecase: EmailUseCase<R, C, P, S>,
    publisher: Arc<P>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<R, C, P, S> EmailSubscriber<R, C, P, S>
where
    R: EmailRepository + 'static,
    C: EmailCache + 'static,
    P: Publisher + 'static,
    S: SmtpClient + 'static,
{
    pub fn new(
        pool: WorkerPool,
        config: PipelineConfig,
        usecase: EmailUseCase<R, C, P, S>,
        publisher: Arc<P>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            pool,
            config,
            usecase,
            publisher,
            metrics,
        }
    }

    /// Start both pools and return without waiting on them.
    ///
    /// Workers stop fetching once `shutdown` is cancelled; in-flight retries
    /// abort and their messages stay unacked for redelivery.
    pub fn run(&self, shutdown: CancellationToken) -> Vec<Subscription> {
        let handlers = EmailHandlers::new(
            self.usecase.clone(),
            self.publisher.clone(),
            self.metrics.clone(),
            &self.config,
            shutdown.clone(),
        );

        info!(
            queue_group = %self.config.queue_group,
            create_workers = self.config.create_workers,
            send_workers = self.config.send_workers,
            "Starting email subscribers"
        );

        vec![
            self.pool.subscribe(
                CREATE_SUBJECT,
                &self.config.queue_group,
                self.config.create_workers,
                handlers.create,
                shutdown.clone(),
            ),
            self.pool.subscribe(
                SEND_SUBJECT,
                &self.config.queue_group,
                self.config.send_workers,
                handlers.send,
                shutdown,
            ),
        ]
    }
}

//! Queue-group worker pools over JetStream durable pull consumers.

use crate::config::{durable_name, SubscriptionConfig};
use crate::consumer::{JetStreamSource, MessageSource};
use crate::error::NatsError;
use crate::handler::MessageHandler;
use async_nats::jetstream::Context;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Starts competing workers for a subject within a queue group.
#[derive(Clone)]
pub struct WorkerPool {
    jetstream: Context,
    config: SubscriptionConfig,
}

impl WorkerPool {
    pub fn new(jetstream: Context, config: SubscriptionConfig) -> Self {
        Self { jetstream, config }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Spawn `worker_count` workers for `subject` in `queue_group`.
    ///
    /// Each worker binds its own consumer handle; a worker that fails to bind
    /// logs and exits without affecting its siblings. Workers stop fetching
    /// once `shutdown` is cancelled; a message already being handled is
    /// finished first.
    pub fn subscribe<H: MessageHandler>(
        &self,
        subject: &str,
        queue_group: &str,
        worker_count: usize,
        handler: Arc<H>,
        shutdown: CancellationToken,
    ) -> Subscription {
        let durable = durable_name(queue_group, subject);
        info!(
            subject = %subject,
            queue_group = %queue_group,
            durable = %durable,
            workers = worker_count,
            "Subscribing worker pool"
        );

        let jetstream = self.jetstream.clone();
        let config = self.config.clone();
        let bind_subject = subject.to_string();
        spawn_workers(subject, worker_count, handler, shutdown, move |_| {
            let jetstream = jetstream.clone();
            let config = config.clone();
            let subject = bind_subject.clone();
            let durable = durable.clone();
            async move {
                JetStreamSource::bind(&jetstream, &subject, &durable, &config, worker_count).await
            }
        })
    }
}

/// Spawn one task per worker; each awaits `bind(worker_id)` for its source.
pub(crate) fn spawn_workers<S, H, B, Fut>(
    subject: &str,
    worker_count: usize,
    handler: Arc<H>,
    shutdown: CancellationToken,
    bind: B,
) -> Subscription
where
    S: MessageSource,
    H: MessageHandler,
    B: Fn(usize) -> Fut,
    Fut: Future<Output = Result<S, NatsError>> + Send + 'static,
{
    let mut workers = JoinSet::new();
    for worker_id in 0..worker_count {
        let worker = Worker {
            id: worker_id,
            subject: subject.to_string(),
        };
        workers.spawn(worker.run(bind(worker_id), handler.clone(), shutdown.clone()));
    }

    Subscription {
        subject: subject.to_string(),
        workers,
    }
}

/// Handle to the workers of one subscribed subject.
pub struct Subscription {
    subject: String,
    workers: JoinSet<()>,
}

impl Subscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait until every worker has exited.
    pub async fn wait(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(subject = %self.subject, error = %e, "Worker task panicked");
            }
        }
        info!(subject = %self.subject, "Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    subject: String,
}

impl Worker {
    async fn run<S, H, Fut>(self, bind: Fut, handler: Arc<H>, shutdown: CancellationToken)
    where
        S: MessageSource,
        H: MessageHandler,
        Fut: Future<Output = Result<S, NatsError>>,
    {
        debug!(worker_id = self.id, subject = %self.subject, "Starting worker");

        let source = match bind.await {
            Ok(source) => source,
            Err(e) => {
                error!(
                    worker_id = self.id,
                    subject = %self.subject,
                    error = %e,
                    "Worker failed to bind consumer"
                );
                return;
            }
        };

        self.consume(&source, handler.as_ref(), &shutdown).await;
        debug!(worker_id = self.id, subject = %self.subject, "Worker stopped");
    }

    async fn consume<S, H>(&self, source: &S, handler: &H, shutdown: &CancellationToken)
    where
        S: MessageSource,
        H: MessageHandler,
    {
        loop {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                fetched = source.fetch() => fetched,
            };

            let mut messages = match fetched {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(worker_id = self.id, subject = %self.subject, error = %e, "Fetch failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                    }
                }
            };

            loop {
                // Messages not yet taken from the batch stay unacked and are redelivered
                let next = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    next = messages.next() => next,
                };

                match next {
                    Some(Ok(message)) => {
                        if let Err(e) = message.in_progress().await {
                            debug!(worker_id = self.id, error = %e, "Progress ack failed");
                        }
                        handler.handle(message).await;
                    }
                    Some(Err(e)) => {
                        warn!(worker_id = self.id, subject = %self.subject, error = %e, "Error receiving message");
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::MessageStream;
    use crate::envelope::{InboundMessage, MessageEnvelope};
    use crate::testing::{AckCount, RecordingAcker};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out pre-built batches; an empty queue behaves like an idle broker.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        batches: Arc<Mutex<VecDeque<Vec<InboundMessage>>>>,
    }

    impl ScriptedSource {
        fn push(&self, sequences: impl IntoIterator<Item = u64>) -> Vec<AckCount> {
            let mut acks = Vec::new();
            let batch = sequences
                .into_iter()
                .map(|sequence| {
                    let (acker, count) = RecordingAcker::new();
                    acks.push(count);
                    let envelope = MessageEnvelope::new("test:work", sequence, b"{}".to_vec(), Utc::now());
                    InboundMessage::new(envelope, acker)
                })
                .collect();
            self.batches.lock().unwrap().push_back(batch);
            acks
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn fetch(&self) -> Result<MessageStream, NatsError> {
            let batch = self.batches.lock().unwrap().pop_front();
            match batch {
                Some(batch) => Ok(futures::stream::iter(batch.into_iter().map(Ok)).boxed()),
                None => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(futures::stream::empty().boxed())
                }
            }
        }
    }

    /// Acks and records every sequence; optionally cancels after the first one.
    #[derive(Default)]
    struct RecordingHandler {
        sequences: Mutex<Vec<u64>>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl RecordingHandler {
        fn sequences(&self) -> Vec<u64> {
            self.sequences.lock().unwrap().clone()
        }

        async fn wait_for(&self, count: usize) {
            tokio::time::timeout(Duration::from_secs(10), async {
                while self.sequences().len() < count {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("messages were not handled");
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: InboundMessage) {
            self.sequences.lock().unwrap().push(message.envelope().sequence);
            message.ack().await.unwrap();
            if let Some(cancel) = &self.cancel_after_first {
                cancel.cancel();
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_message_handled_by_exactly_one_worker() {
        let source = ScriptedSource::default();
        let acks: Vec<AckCount> = (0..4)
            .flat_map(|batch| source.push(batch * 3 + 1..=batch * 3 + 3))
            .collect();
        let handler = Arc::new(RecordingHandler::default());
        let shutdown = CancellationToken::new();

        let subscription = spawn_workers("test:work", 3, handler.clone(), shutdown.clone(), {
            let source = source.clone();
            move |_| {
                let source = source.clone();
                async move { Ok::<_, NatsError>(source) }
            }
        });

        handler.wait_for(12).await;
        shutdown.cancel();
        subscription.wait().await;

        let mut handled = handler.sequences();
        handled.sort_unstable();
        assert_eq!(handled, (1..=12).collect::<Vec<_>>());
        for count in &acks {
            assert_eq!(count.count(), 1);
            assert_eq!(count.progress(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_failure_leaves_siblings_running() {
        let source = ScriptedSource::default();
        source.push([1, 2]);
        source.push([3]);
        let handler = Arc::new(RecordingHandler::default());
        let shutdown = CancellationToken::new();

        let subscription = spawn_workers("test:work", 3, handler.clone(), shutdown.clone(), {
            let source = source.clone();
            move |worker_id| {
                let source = source.clone();
                async move {
                    if worker_id == 0 {
                        Err(NatsError::JetStream("consumer not found".to_string()))
                    } else {
                        Ok(source)
                    }
                }
            }
        });

        handler.wait_for(3).await;
        shutdown.cancel();
        subscription.wait().await;

        assert_eq!(handler.sequences().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_leaves_rest_of_batch_unacked() {
        let source = ScriptedSource::default();
        let acks = source.push([1, 2, 3]);
        let shutdown = CancellationToken::new();
        let handler = Arc::new(RecordingHandler {
            cancel_after_first: Some(shutdown.clone()),
            ..Default::default()
        });

        let subscription = spawn_workers("test:work", 1, handler.clone(), shutdown.clone(), {
            let source = source.clone();
            move |_| {
                let source = source.clone();
                async move { Ok::<_, NatsError>(source) }
            }
        });
        subscription.wait().await;

        assert_eq!(handler.sequences(), vec![1]);
        assert_eq!(acks[0].count(), 1);
        assert_eq!(acks[1].count(), 0);
        assert_eq!(acks[2].count(), 0);
        assert_eq!(acks[1].progress(), 0);
    }
}

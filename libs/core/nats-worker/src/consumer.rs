//! JetStream stream and durable consumer management.

use crate::config::{StreamSpec, SubscriptionConfig};
use crate::envelope::InboundMessage;
use crate::error::NatsError;
use async_nats::jetstream::consumer::pull::Config as ConsumerConfig;
use async_nats::jetstream::consumer::{self, AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::context::GetStreamErrorKind;
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::{Context, ErrorCode};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, info};

/// Ensure the stream exists, creating it if the broker reports it missing.
pub async fn ensure_stream(jetstream: &Context, spec: &StreamSpec) -> Result<(), NatsError> {
    match jetstream.get_stream(&spec.name).await {
        Ok(mut stream) => {
            let info = stream.info().await.map_err(NatsError::from_jetstream_error)?;
            debug!(
                stream = %spec.name,
                messages = info.state.messages,
                "Stream already exists"
            );
            Ok(())
        }
        Err(e) if is_stream_not_found(&e.kind()) => {
            info!(stream = %spec.name, subjects = ?spec.subjects, "Creating stream");

            jetstream
                .create_stream(StreamConfig {
                    name: spec.name.clone(),
                    subjects: spec.subjects.clone(),
                    max_messages: spec.max_messages,
                    max_age: spec.max_age,
                    ..Default::default()
                })
                .await
                .map_err(NatsError::from_jetstream_error)?;

            info!(stream = %spec.name, "Stream created");
            Ok(())
        }
        Err(e) => Err(NatsError::JetStream(format!(
            "failed to look up stream {}: {e}",
            spec.name
        ))),
    }
}

fn is_stream_not_found(kind: &GetStreamErrorKind) -> bool {
    matches!(kind, GetStreamErrorKind::JetStream(e) if e.error_code() == ErrorCode::STREAM_NOT_FOUND)
}

/// Consumer settings for a queue group's durable on `subject`.
pub(crate) fn consumer_config(
    subject: &str,
    durable: &str,
    config: &SubscriptionConfig,
    worker_count: usize,
) -> ConsumerConfig {
    let max_ack_pending =
        i64::try_from(worker_count.max(1) * config.max_in_flight).unwrap_or(i64::MAX);

    ConsumerConfig {
        durable_name: Some(durable.to_string()),
        name: Some(durable.to_string()),
        ack_policy: AckPolicy::Explicit,
        ack_wait: config.ack_wait,
        max_ack_pending,
        deliver_policy: if config.deliver_all {
            DeliverPolicy::All
        } else {
            DeliverPolicy::New
        },
        filter_subject: subject.to_string(),
        ..Default::default()
    }
}

/// Names of the delivery settings where a stored consumer differs from `desired`.
pub(crate) fn config_drift(current: &consumer::Config, desired: &ConsumerConfig) -> Vec<&'static str> {
    let mut drift = Vec::new();
    if current.ack_wait != desired.ack_wait {
        drift.push("ack_wait");
    }
    if current.max_ack_pending != desired.max_ack_pending {
        drift.push("max_ack_pending");
    }
    if current.filter_subject != desired.filter_subject {
        drift.push("filter_subject");
    }
    drift
}

/// Bind to the durable pull consumer shared by a queue group, creating it on
/// first use. Every worker of the group binds to the same durable, so each
/// message is handed to exactly one of them.
///
/// A durable stored with different delivery settings is updated in place.
pub async fn bind_consumer(
    jetstream: &Context,
    subject: &str,
    durable: &str,
    config: &SubscriptionConfig,
    worker_count: usize,
) -> Result<PullConsumer, NatsError> {
    let stream_name = jetstream
        .stream_by_subject(subject)
        .await
        .map_err(NatsError::from_jetstream_error)?;

    let stream = jetstream
        .get_stream(&stream_name)
        .await
        .map_err(NatsError::from_jetstream_error)?;

    let desired = consumer_config(subject, durable, config, worker_count);
    let mut consumer: PullConsumer = stream
        .get_or_create_consumer(durable, desired.clone())
        .await
        .map_err(NatsError::from_jetstream_error)?;

    let drift = config_drift(&consumer.cached_info().config, &desired);
    if !drift.is_empty() {
        info!(consumer = %durable, fields = ?drift, "Consumer settings changed, updating");
        consumer = stream
            .update_consumer(desired)
            .await
            .map_err(NatsError::from_jetstream_error)?;
    }

    debug!(stream = %stream_name, consumer = %durable, subject = %subject, "Consumer bound");
    Ok(consumer)
}

/// Messages of one fetch, yielded as the broker delivers them.
pub type MessageStream = BoxStream<'static, Result<InboundMessage, NatsError>>;

/// Where a worker pulls its messages from.
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<MessageStream, NatsError>;
}

/// [`MessageSource`] over a bound durable pull consumer.
pub struct JetStreamSource {
    consumer: PullConsumer,
    config: SubscriptionConfig,
}

impl JetStreamSource {
    pub async fn bind(
        jetstream: &Context,
        subject: &str,
        durable: &str,
        config: &SubscriptionConfig,
        worker_count: usize,
    ) -> Result<Self, NatsError> {
        let consumer = bind_consumer(jetstream, subject, durable, config, worker_count).await?;
        Ok(Self {
            consumer,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for JetStreamSource {
    /// Request up to `max_in_flight` messages, waiting at most `fetch_expires`.
    async fn fetch(&self) -> Result<MessageStream, NatsError> {
        let batch = self
            .consumer
            .fetch()
            .max_messages(self.config.max_in_flight)
            .expires(self.config.fetch_expires)
            .messages()
            .await
            .map_err(NatsError::from_jetstream_error)?;

        Ok(batch
            .map(|message| {
                message
                    .map(InboundMessage::from)
                    .map_err(NatsError::from_jetstream_error)
            })
            .boxed())
    }
}

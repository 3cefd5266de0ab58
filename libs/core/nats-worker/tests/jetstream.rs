//! Publisher, consumer and worker pool behaviour against a real NATS server.
//!
//! Run with `cargo test -p nats-worker -- --ignored` (requires Docker).

use async_trait::async_trait;
use nats_worker::{
    bind_consumer, ensure_stream, AckHandler, CancellationToken, InboundMessage,
    JetStreamPublisher, MessageHandler, Publisher, StreamSpec, SubscriptionConfig, WorkerPool,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::TestNats;
use tokio::sync::oneshot;

const STREAM: &str = "WORK";
const SUBJECT: &str = "work:items";

async fn nats_with_stream() -> TestNats {
    let nats = TestNats::new().await;
    ensure_stream(&nats.jetstream(), &StreamSpec::new(STREAM, &[SUBJECT]))
        .await
        .unwrap();
    nats
}

/// Records the sequence of every message it handles.
#[derive(Default)]
struct CountingHandler {
    handled: Mutex<Vec<u64>>,
}

impl CountingHandler {
    fn handled(&self) -> Vec<u64> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(&self, message: InboundMessage) {
        self.handled.lock().unwrap().push(message.envelope().sequence);
        // Hold the message long enough for siblings to compete
        tokio::time::sleep(Duration::from_millis(5)).await;
        message.ack().await.unwrap();
    }
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_ensure_stream_is_idempotent() {
    let nats = nats_with_stream().await;

    ensure_stream(&nats.jetstream(), &StreamSpec::new(STREAM, &[SUBJECT]))
        .await
        .unwrap();

    assert_eq!(nats.stream_len(STREAM).await, 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_publish_async_acks_with_stream_sequence() {
    let nats = nats_with_stream().await;
    let publisher = JetStreamPublisher::new(nats.jetstream());

    let (tx, rx) = oneshot::channel();
    let on_ack: AckHandler = Box::new(move |result| {
        let _ = tx.send(result);
    });
    publisher
        .publish_async(SUBJECT, b"{\"n\":1}".to_vec(), on_ack)
        .unwrap();

    let sequence = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("callback was not invoked")
        .unwrap()
        .unwrap();

    assert_eq!(sequence, 1);
    assert_eq!(nats.stream_len(STREAM).await, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_pool_handles_each_message_once() {
    let nats = nats_with_stream().await;
    let publisher = JetStreamPublisher::new(nats.jetstream());
    let total = 30;
    for n in 0..total {
        publisher
            .publish(SUBJECT, format!("{{\"n\":{n}}}").into_bytes())
            .await
            .unwrap();
    }

    let pool = WorkerPool::new(
        nats.jetstream(),
        SubscriptionConfig::default()
            .with_max_in_flight(4)
            .with_fetch_expires(Duration::from_millis(500)),
    );
    let handler = Arc::new(CountingHandler::default());
    let shutdown = CancellationToken::new();
    let subscription = pool.subscribe(SUBJECT, "workers", 3, handler.clone(), shutdown.clone());

    tokio::time::timeout(Duration::from_secs(20), async {
        while handler.handled().len() < total {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("not every message was handled");

    // Give a late duplicate the chance to show up
    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    subscription.wait().await;

    let handled = handler.handled();
    let unique: HashSet<u64> = handled.iter().copied().collect();
    assert_eq!(handled.len(), total);
    assert_eq!(unique, (1..=total as u64).collect());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_rebinding_applies_changed_consumer_settings() {
    let nats = nats_with_stream().await;
    let jetstream = nats.jetstream();

    let config = SubscriptionConfig::default().with_ack_wait(Duration::from_secs(30));
    let consumer = bind_consumer(&jetstream, SUBJECT, "workers_work-items", &config, 2)
        .await
        .unwrap();
    assert_eq!(consumer.cached_info().config.ack_wait, Duration::from_secs(30));

    let config = config.with_ack_wait(Duration::from_secs(90));
    let mut consumer = bind_consumer(&jetstream, SUBJECT, "workers_work-items", &config, 4)
        .await
        .unwrap();

    let info = consumer.info().await.unwrap();
    assert_eq!(info.config.ack_wait, Duration::from_secs(90));
    assert_eq!(info.config.max_ack_pending, 4 * config.max_in_flight as i64);
}

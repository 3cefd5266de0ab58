//! In-memory fakes for exercising handlers without a broker.

use crate::envelope::Acknowledger;
use crate::error::NatsError;
use crate::metrics::MetricsRecorder;
use crate::publisher::{AckHandler, Publisher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared view of how many times a [`RecordingAcker`] acked or reported progress.
#[derive(Debug, Clone, Default)]
pub struct AckCount {
    acked: Arc<AtomicUsize>,
    progress: Arc<AtomicUsize>,
}

impl AckCount {
    pub fn count(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }
}

/// Acknowledger that counts acks.
pub struct RecordingAcker {
    acks: AckCount,
    fail: bool,
}

impl RecordingAcker {
    pub fn new() -> (Self, AckCount) {
        let acks = AckCount::default();
        (
            Self {
                acks: acks.clone(),
                fail: false,
            },
            acks,
        )
    }

    /// Acker whose ack always fails.
    pub fn failing() -> Self {
        Self {
            acks: AckCount::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self) -> Result<(), NatsError> {
        if self.fail {
            return Err(NatsError::consumer_error("ack rejected"));
        }
        self.acks.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn in_progress(&self) -> Result<(), NatsError> {
        self.acks.progress.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Publisher that keeps every payload in memory.
#[derive(Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    sequence: AtomicU64,
    fail_subjects: Mutex<Vec<String>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `subject` fail.
    pub fn fail_on(&self, subject: impl Into<String>) {
        if let Ok(mut subjects) = self.fail_subjects.lock() {
            subjects.push(subject.into());
        }
    }

    /// All `(subject, payload)` pairs published so far.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Payloads published to one subject.
    pub fn published_to(&self, subject: &str) -> Vec<Vec<u8>> {
        self.published()
            .into_iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, payload)| payload)
            .collect()
    }

    fn record(&self, subject: &str, payload: Vec<u8>) -> Result<u64, NatsError> {
        let failing = self
            .fail_subjects
            .lock()
            .map(|s| s.iter().any(|f| f == subject))
            .unwrap_or(false);
        if failing {
            return Err(NatsError::publish_error(format!("publish to {subject} rejected")));
        }

        if let Ok(mut published) = self.published.lock() {
            published.push((subject.to_string(), payload));
        }
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64, NatsError> {
        self.record(subject, payload)
    }

    fn publish_async(
        &self,
        subject: &str,
        payload: Vec<u8>,
        on_ack: AckHandler,
    ) -> Result<String, NatsError> {
        let result = self.record(subject, payload);
        on_ack(result);
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

/// Recorder that counts events, for asserting on pipeline outcomes.
#[derive(Debug, Default)]
pub struct CountingRecorder {
    pub received: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub dead_lettered: AtomicUsize,
    pub retries: AtomicUsize,
    pub operations: AtomicUsize,
}

impl CountingRecorder {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl MetricsRecorder for CountingRecorder {
    fn message_received(&self, _subject: &str) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }

    fn message_succeeded(&self, _subject: &str) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    fn message_failed(&self, _subject: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn message_dead_lettered(&self, _subject: &str) {
        self.dead_lettered.fetch_add(1, Ordering::SeqCst);
    }

    fn retry_attempted(&self, _subject: &str, retries: u32) {
        self.retries.fetch_add(retries as usize, Ordering::SeqCst);
    }

    fn operation_duration(&self, _operation: &'static str, _duration: Duration, _success: bool) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

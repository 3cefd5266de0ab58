//! Injected metrics recording for the email pipeline.

use crate::error::NatsError;
use metrics::{counter, histogram};
use std::time::Duration;

/// Observer for pipeline events.
///
/// Components receive an `Arc<dyn MetricsRecorder>` instead of touching
/// process-wide counters, so tests can swap in [`NoopRecorder`] or a counting fake.
pub trait MetricsRecorder: Send + Sync {
    fn message_received(&self, subject: &str);
    fn message_succeeded(&self, subject: &str);
    fn message_failed(&self, subject: &str);
    fn message_dead_lettered(&self, subject: &str);
    fn retry_attempted(&self, subject: &str, retries: u32);
    fn operation_duration(&self, operation: &'static str, duration: Duration, success: bool);
}

/// Recorder that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn message_received(&self, _subject: &str) {}
    fn message_succeeded(&self, _subject: &str) {}
    fn message_failed(&self, _subject: &str) {}
    fn message_dead_lettered(&self, _subject: &str) {}
    fn retry_attempted(&self, _subject: &str, _retries: u32) {}
    fn operation_duration(&self, _operation: &'static str, _duration: Duration, _success: bool) {}
}

/// Recorder backed by the `metrics` facade (exported via Prometheus).
#[derive(Debug, Clone)]
pub struct PrometheusRecorder {
    service: String,
}

impl PrometheusRecorder {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn message_received(&self, subject: &str) {
        counter!(
            "nats_email_incoming_messages_total",
            "service" => self.service.clone(),
            "subject" => subject.to_string()
        )
        .increment(1);
    }

    fn message_succeeded(&self, subject: &str) {
        counter!(
            "nats_email_success_incoming_messages_total",
            "service" => self.service.clone(),
            "subject" => subject.to_string()
        )
        .increment(1);
    }

    fn message_failed(&self, subject: &str) {
        counter!(
            "nats_email_error_incoming_messages_total",
            "service" => self.service.clone(),
            "subject" => subject.to_string()
        )
        .increment(1);
    }

    fn message_dead_lettered(&self, subject: &str) {
        counter!(
            "nats_email_dead_lettered_messages_total",
            "service" => self.service.clone(),
            "subject" => subject.to_string()
        )
        .increment(1);
    }

    fn retry_attempted(&self, subject: &str, retries: u32) {
        counter!(
            "nats_email_retry_attempts_total",
            "service" => self.service.clone(),
            "subject" => subject.to_string()
        )
        .increment(u64::from(retries));
    }

    fn operation_duration(&self, operation: &'static str, duration: Duration, success: bool) {
        histogram!(
            "email_operation_duration_seconds",
            "service" => self.service.clone(),
            "operation" => operation,
            "outcome" => if success { "success" } else { "error" }
        )
        .record(duration.as_secs_f64());
    }
}

/// Install the Prometheus recorder and return the handle used by `/metrics`.
pub fn init_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle, NatsError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| NatsError::Config(format!("failed to install Prometheus recorder: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_recorder_without_installed_recorder() {
        // With no global recorder installed the facade is a no-op; must not panic
        let recorder = PrometheusRecorder::new("email_service");
        recorder.message_received("mail:create");
        recorder.retry_attempted("mail:create", 2);
        recorder.operation_duration("create", Duration::from_millis(5), true);
    }
}

use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use nats_worker::{RetryExecutor, SubscriptionConfig};
use std::time::Duration;

/// Delivery parameters shared by the create and send pools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub queue_group: String,
    pub create_workers: usize,
    pub send_workers: usize,
    pub ack_wait: Duration,
    pub max_in_flight: usize,
    /// Redeliveries tolerated before a failing message is dead-lettered
    pub max_redelivery: u32,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_group: "email_service".to_string(),
            create_workers: 6,
            send_workers: 6,
            ack_wait: Duration::from_secs(60),
            max_in_flight: 5,
            max_redelivery: 3,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    pub fn subscription(&self) -> SubscriptionConfig {
        SubscriptionConfig::default()
            .with_ack_wait(self.ack_wait)
            .with_max_in_flight(self.max_in_flight)
    }

    pub fn retry(&self) -> RetryExecutor {
        RetryExecutor::new(self.retry_attempts, self.retry_delay)
    }
}

impl FromEnv for PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            queue_group: env_or_default("EMAIL_QUEUE_GROUP", &defaults.queue_group),
            create_workers: env_parse("EMAIL_WORKERS_CREATE", defaults.create_workers)?,
            send_workers: env_parse("EMAIL_WORKERS_SEND", defaults.send_workers)?,
            ack_wait: Duration::from_secs(env_parse("EMAIL_ACK_WAIT_SECS", 60)?),
            max_in_flight: env_parse("EMAIL_MAX_INFLIGHT", defaults.max_in_flight)?,
            max_redelivery: env_parse("EMAIL_MAX_REDELIVERY", defaults.max_redelivery)?,
            retry_attempts: env_parse("EMAIL_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            retry_delay: Duration::from_millis(env_parse("EMAIL_RETRY_DELAY_MS", 1000)?),
        })
    }
}

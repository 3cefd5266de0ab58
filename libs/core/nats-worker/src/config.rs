//! Stream and subscription configuration.

use std::time::Duration;

/// JetStream stream definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    pub subjects: Vec<String>,
    pub max_messages: i64,
    pub max_age: Duration,
}

impl StreamSpec {
    /// A stream keeping up to 100k messages for 7 days.
    pub fn new(name: impl Into<String>, subjects: &[&str]) -> Self {
        Self {
            name: name.into(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            max_messages: 100_000,
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    pub fn with_max_messages(mut self, max_messages: i64) -> Self {
        self.max_messages = max_messages;
        self
    }

}

/// Delivery settings shared by every worker of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Redelivery happens if a message is not acked within this window
    pub ack_wait: Duration,
    /// Max unacked messages one worker holds at a time (fetch batch size)
    pub max_in_flight: usize,
    /// How long one fetch waits for messages before returning empty
    pub fetch_expires: Duration,
    /// Start from the first stored message when the durable is created
    pub deliver_all: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(60),
            max_in_flight: 5,
            fetch_expires: Duration::from_secs(5),
            deliver_all: true,
        }
    }
}

impl SubscriptionConfig {
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_fetch_expires(mut self, fetch_expires: Duration) -> Self {
        self.fetch_expires = fetch_expires;
        self
    }
}

/// Durable consumer name for a queue group on a subject.
///
/// Consumer names may not contain `.`, `*`, `>`, whitespace or path
/// separators; `:` is replaced too so names read the same in `nats` CLI output.
pub fn durable_name(queue_group: &str, subject: &str) -> String {
    format!("{queue_group}_{subject}")
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ':' | '/' | '\\' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_name() {
        assert_eq!(durable_name("email_service", "mail:create"), "email_service_mail-create");
        assert_eq!(durable_name("group", "orders.*.new"), "group_orders---new");
        assert_eq!(durable_name("a b", "c>"), "a-b_c-");
    }

    #[test]
    fn test_subscription_builder() {
        let config = SubscriptionConfig::default()
            .with_ack_wait(Duration::from_secs(30))
            .with_max_in_flight(0)
            .with_fetch_expires(Duration::from_secs(1));

        assert_eq!(config.ack_wait, Duration::from_secs(30));
        assert_eq!(config.max_in_flight, 1);
        assert_eq!(config.fetch_expires, Duration::from_secs(1));
        assert!(config.deliver_all);
    }

    #[test]
    fn test_stream_spec() {
        let spec = StreamSpec::new("MAIL", &["mail:create", "mail:send"]).with_max_messages(10);
        assert_eq!(spec.subjects, vec!["mail:create", "mail:send"]);
        assert_eq!(spec.max_messages, 10);
    }
}

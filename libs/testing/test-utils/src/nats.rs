//! NATS test infrastructure
//!
//! `TestNats` runs a JetStream-enabled NATS server in a container.

use async_nats::jetstream::{self, stream};
use async_nats::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::nats::Nats;

/// NATS server with JetStream (`-js`), removed when dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestNats;
///
/// # async fn example() {
/// let nats = TestNats::new().await;
/// nats.create_stream("MAIL_ERRORS", &["mail:errors"]).await;
/// assert_eq!(nats.stream_len("MAIL_ERRORS").await, 0);
/// # }
/// ```
pub struct TestNats {
    _container: ContainerAsync<Nats>,
    client: Client,
    url: String,
}

impl TestNats {
    pub async fn new() -> Self {
        let container = Nats::default()
            .with_tag("latest")
            .with_cmd(["-js"])
            .start()
            .await
            .expect("Failed to start NATS container");

        let port = container
            .get_host_port_ipv4(4222)
            .await
            .expect("Failed to get NATS port");
        let url = format!("nats://127.0.0.1:{port}");

        let client = async_nats::ConnectOptions::new()
            .name("test-utils")
            .connect(url.as_str())
            .await
            .expect("Failed to connect to NATS");

        tracing::info!(%url, "Test NATS ready with JetStream");

        Self {
            _container: container,
            client,
            url,
        }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn jetstream(&self) -> jetstream::Context {
        jetstream::new(self.client.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create (or fetch) a file-backed stream over `subjects`.
    pub async fn create_stream(&self, name: &str, subjects: &[&str]) -> stream::Stream {
        self.jetstream()
            .get_or_create_stream(stream::Config {
                name: name.to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            })
            .await
            .expect("Failed to create stream")
    }

    /// Number of messages currently stored in stream `name`.
    pub async fn stream_len(&self, name: &str) -> u64 {
        let mut stream = self
            .jetstream()
            .get_stream(name)
            .await
            .expect("Stream does not exist");
        stream.info().await.expect("Failed to read stream info").state.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_durable_consumer_shares_messages() {
        let nats = TestNats::new().await;
        let stream = nats.create_stream("MAIL", &["mail:create", "mail:send"]).await;
        let jetstream = nats.jetstream();

        for i in 0..3 {
            jetstream
                .publish("mail:create", format!("{{\"n\":{i}}}").into())
                .await
                .unwrap()
                .await
                .unwrap();
        }
        jetstream
            .publish("mail:send", "{}".into())
            .await
            .unwrap()
            .await
            .unwrap();
        assert_eq!(nats.stream_len("MAIL").await, 4);

        let consumer = stream
            .get_or_create_consumer(
                "email_service_mail-create",
                jetstream::consumer::pull::Config {
                    durable_name: Some("email_service_mail-create".to_string()),
                    filter_subject: "mail:create".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut batch = consumer.fetch().max_messages(10).messages().await.unwrap();
        let mut received = 0;
        while let Some(Ok(message)) = batch.next().await {
            assert_eq!(message.subject.as_str(), "mail:create");
            message.ack().await.unwrap();
            received += 1;
        }

        assert_eq!(received, 3);
    }
}

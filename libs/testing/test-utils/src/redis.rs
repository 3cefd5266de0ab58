//! Redis test infrastructure

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Redis container plus the `ConnectionManager` the email cache runs on.
///
/// The container is removed when this value is dropped.
///
/// ```no_run
/// use test_utils::TestRedis;
///
/// # async fn example() {
/// let redis = TestRedis::new().await;
/// let cache_conn = redis.connection();
/// assert!(redis.ttl("emails:missing").await < 0);
/// # }
/// ```
pub struct TestRedis {
    _container: ContainerAsync<Redis>,
    connection: ConnectionManager,
    pub uri: String,
}

impl TestRedis {
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag("8-alpine")
            .start()
            .await
            .expect("Failed to start Redis container");

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");
        let uri = format!("redis://127.0.0.1:{port}");

        let client = redis::Client::open(uri.as_str()).expect("Invalid Redis URI");
        let connection = ConnectionManager::new(client)
            .await
            .expect("Failed to connect to Redis");

        tracing::info!(%uri, "Test Redis ready");

        Self {
            _container: container,
            connection,
            uri,
        }
    }

    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Remaining TTL of `key` in seconds (-2 when absent, -1 when persistent).
    pub async fn ttl(&self, key: &str) -> i64 {
        self.connection().ttl(key).await.expect("TTL failed")
    }

    pub async fn flush(&self) {
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut self.connection())
            .await
            .expect("FLUSHDB failed");
    }
}

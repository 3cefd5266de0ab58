//! Shared test utilities for the mail pipeline
//!
//! - `TestDatabase`: PostgreSQL container with the emails schema migrated (feature: "postgres")
//! - `TestRedis`: Redis container with a `ConnectionManager` (feature: "redis")
//! - `TestNats`: NATS container with JetStream enabled (feature: "nats")
//! - `TestDataBuilder`: Deterministic email fixtures (always available)
//!
//! All container helpers need a running Docker daemon; tests using them are
//! marked `#[ignore]` and run with `cargo test -- --ignored`.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["all"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! #[ignore] // Requires Docker
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_postgres_test");
//!     let to = builder.address("recipient");
//! }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "nats")]
mod nats;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

#[cfg(feature = "nats")]
pub use nats::TestNats;

/// Builder for email fixtures with deterministic, test-unique values
///
/// Values embed a seed derived from the test name, so parallel tests sharing
/// a container do not match each other's rows in full-text searches.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_search_emails");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Mailbox address unique to this builder, e.g. `sender-1234@example.com`
    pub fn address(&self, local: &str) -> String {
        format!("{}-{}@example.com", local, self.seed)
    }

    /// Single search token unique to this builder
    pub fn token(&self) -> String {
        format!("tok{}", self.seed)
    }

    /// Subject line containing [`Self::token`]
    pub fn subject(&self, suffix: &str) -> String {
        format!("{} {}", self.token(), suffix)
    }
}

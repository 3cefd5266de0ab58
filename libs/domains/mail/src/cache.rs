use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use uuid::Uuid;

use crate::error::MailResult;
use crate::models::Email;

/// Key prefix for cached emails
const KEY_PREFIX: &str = "emails";

/// How long a cached email stays readable (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Read-through cache for email records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailCache: Send + Sync {
    async fn get_email(&self, id: Uuid) -> MailResult<Option<Email>>;

    async fn set_email(&self, email: &Email) -> MailResult<()>;

    async fn delete_email(&self, id: Uuid) -> MailResult<()>;
}

/// [`EmailCache`] on Redis; entries are JSON strings with a fixed TTL.
#[derive(Clone)]
pub struct RedisEmailCache {
    redis: ConnectionManager,
    ttl: Duration,
}

impl RedisEmailCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn key(id: Uuid) -> String {
        format!("{KEY_PREFIX}:{id}")
    }
}

#[async_trait]
impl EmailCache for RedisEmailCache {
    async fn get_email(&self, id: Uuid) -> MailResult<Option<Email>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(Self::key(id)).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_email(&self, email: &Email) -> MailResult<()> {
        let mut conn = self.redis.clone();
        let value = serde_json::to_string(email)?;

        conn.set_ex::<_, _, ()>(Self::key(email.id), value, self.ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete_email(&self, id: Uuid) -> MailResult<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(Self::key(id)).await?;
        Ok(())
    }
}

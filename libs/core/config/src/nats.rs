use crate::{env_or_default, ConfigError, FromEnv};

/// NATS connection configuration
#[derive(Clone, Debug)]
pub struct NatsConfig {
    pub url: String,
    /// Client name reported to the server (shows up in `nats server report connections`)
    pub client_name: String,
}

impl FromEnv for NatsConfig {
    /// - NATS_URL: defaults to nats://localhost:4222
    /// - NATS_CLIENT_NAME: defaults to email_service
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("NATS_URL", "nats://localhost:4222"),
            client_name: env_or_default("NATS_CLIENT_NAME", "email_service"),
        })
    }
}

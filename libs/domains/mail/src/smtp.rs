//! SMTP delivery using lettre.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse, env_required};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::time::Duration;

use crate::error::{MailError, MailResult};
use crate::models::MailData;

/// Performs the actual mail transmission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmtpClient: Send + Sync {
    async fn send_mail(&self, mail: &MailData) -> MailResult<()>;
}

/// SMTP relay settings.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender used when a message carries no `from`
    pub from: String,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

impl SmtpConfig {
    /// Local Mailpit/Mailhog on port 1025, no auth.
    pub fn local() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            username: String::new(),
            password: String::new(),
            from: "noreply@localhost".to_string(),
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
        }
    }

    fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("MAIL_HOST")?,
            port: env_parse("MAIL_PORT", 587)?,
            username: env_or_default("MAIL_USERNAME", ""),
            password: env_or_default("MAIL_PASSWORD", ""),
            from: env_or_default("MAIL_FROM", "noreply@localhost"),
            connect_timeout: Duration::from_secs(env_parse("MAIL_CONNECT_TIMEOUT_SECS", 10)?),
            send_timeout: Duration::from_secs(env_parse("MAIL_SEND_TIMEOUT_SECS", 10)?),
        })
    }
}

/// [`SmtpClient`] over an async lettre transport.
pub struct LettreSmtpClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl LettreSmtpClient {
    /// Relay with STARTTLS when credentials are configured, plain otherwise (local dev).
    pub fn new(config: SmtpConfig) -> MailResult<Self> {
        let transport = if config.has_credentials() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                .credentials(creds)
                .port(config.port)
                .timeout(Some(config.connect_timeout))
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .timeout(Some(config.connect_timeout))
                .build()
        };

        Ok(Self { transport, config })
    }

    fn build_message(&self, mail: &MailData) -> MailResult<Message> {
        let from = if mail.from.is_empty() {
            &self.config.from
        } else {
            &mail.from
        };

        let from: Mailbox = from
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("from {from}: {e}")))?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("to {}: {e}", mail.to)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.content.clone())
            .map_err(|e| MailError::Smtp(format!("failed to build message: {e}")))
    }
}

#[async_trait]
impl SmtpClient for LettreSmtpClient {
    async fn send_mail(&self, mail: &MailData) -> MailResult<()> {
        let message = self.build_message(mail)?;

        let response = tokio::time::timeout(self.config.send_timeout, self.transport.send(message))
            .await
            .map_err(|_| {
                MailError::Smtp(format!(
                    "send timed out after {}s",
                    self.config.send_timeout.as_secs()
                ))
            })??;

        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            code = %response.code(),
            "Email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> MailData {
        MailData {
            from: String::new(),
            to: to.to_string(),
            subject: "hi".to_string(),
            content: "hello".to_string(),
        }
    }

    #[test]
    fn test_build_message_falls_back_to_configured_sender() {
        let client = LettreSmtpClient::new(SmtpConfig::local()).unwrap();
        let message = client.build_message(&mail("b@x.com")).unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: noreply@localhost"));
        assert!(raw.contains("To: b@x.com"));
        assert!(raw.contains("Subject: hi"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let client = LettreSmtpClient::new(SmtpConfig::local()).unwrap();
        let err = client.build_message(&mail("not-an-address")).unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress(_)));
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("MAIL_HOST", Some("smtp.example.com")),
                ("MAIL_PORT", Some("2525")),
                ("MAIL_USERNAME", Some("user")),
                ("MAIL_SEND_TIMEOUT_SECS", Some("30")),
            ],
            || {
                let config = SmtpConfig::from_env().unwrap();
                assert_eq!(config.host, "smtp.example.com");
                assert_eq!(config.port, 2525);
                assert!(config.has_credentials());
                assert_eq!(config.connect_timeout, Duration::from_secs(10));
                assert_eq!(config.send_timeout, Duration::from_secs(30));
            },
        );
    }

    #[test]
    fn test_config_requires_host() {
        temp_env::with_var_unset("MAIL_HOST", || {
            assert!(matches!(
                SmtpConfig::from_env(),
                Err(ConfigError::MissingEnvVar(_))
            ));
        });
    }

    #[test]
    fn test_config_rejects_bad_port() {
        temp_env::with_vars(
            [("MAIL_HOST", Some("smtp")), ("MAIL_PORT", Some("abc"))],
            || {
                assert!(matches!(
                    SmtpConfig::from_env(),
                    Err(ConfigError::ParseError { .. })
                ));
            },
        );
    }
}

//! Mail Domain
//!
//! Two-stage email pipeline on NATS JetStream: submitted emails are persisted
//! and re-queued by the create workers, then delivered over SMTP by the send
//! workers. Failures past the redelivery threshold land on `mail:errors`.
//!
//! # Architecture
//!
//! ```text
//! producer ──PublishCreate──▶ mail:create ──▶ create workers ──Create──▶ Postgres
//!                                                  │
//!                                                  ▼
//!                                             mail:send ──▶ send workers ──SendEmail──▶ SMTP
//!
//! GetByID: Redis ──miss──▶ Postgres ──▶ Redis (write-back)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_mail::{EmailUseCase, PgEmailRepository, RedisEmailCache, LettreSmtpClient};
//!
//! let usecase = EmailUseCase::new(
//!     PgEmailRepository::new(db),
//!     RedisEmailCache::new(redis),
//!     publisher.clone(),
//!     LettreSmtpClient::new(smtp_config)?,
//!     metrics.clone(),
//! );
//! let subscriber = EmailSubscriber::new(pool, pipeline, usecase, publisher, metrics);
//! let subscriptions = subscriber.run(shutdown.clone());
//! ```

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod smtp;
pub mod subjects;
pub mod subscriber;
pub mod usecase;

pub use cache::{EmailCache, RedisEmailCache};
pub use config::PipelineConfig;
pub use error::{MailError, MailResult};
pub use models::{Email, EmailsPage, MailData, NewEmail, Pagination};
pub use postgres::PgEmailRepository;
pub use repository::EmailRepository;
pub use smtp::{LettreSmtpClient, SmtpClient, SmtpConfig};
pub use subscriber::{CreateEmailProcessor, EmailHandlers, EmailSubscriber, SendEmailProcessor};
pub use usecase::EmailUseCase;

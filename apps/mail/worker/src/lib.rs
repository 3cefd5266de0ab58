//! Mail Worker Service (NATS JetStream)
//!
//! Runs the `mail:create` and `mail:send` worker pools of the email pipeline.
//!
//! ## Architecture
//!
//! ```text
//! publisher ──► mail:create ──► create workers ──► Postgres (emails)
//!                                     │
//!                                     ▼
//!               mail:send ──► send workers ──► SMTP relay
//!                                     │
//!                (retries exhausted)  ▼
//!                               mail:errors
//! ```
//!
//! Health endpoints (`/health`, `/ready`, `/metrics`) are served on `HEALTH_PORT`.

pub mod config;
pub mod connections;

use crate::config::AppConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::FromEnv;
use domain_mail::subjects;
use domain_mail::{
    EmailSubscriber, EmailUseCase, LettreSmtpClient, PgEmailRepository, RedisEmailCache,
};
use eyre::{Result, WrapErr};
use nats_worker::{
    ensure_stream, init_metrics, CancellationToken, HealthServer, HealthState, JetStreamPublisher,
    MetricsRecorder, PrometheusRecorder, WorkerPool,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Run the mail worker until SIGINT or SIGTERM.
///
/// 1. Sets up error reports, logging and Prometheus metrics
/// 2. Connects to NATS, Postgres (running migrations) and Redis
/// 3. Declares the `MAIL` and `MAIL_ERRORS` streams
/// 4. Starts the health server and both worker pools
/// 5. On shutdown, stops fetching and waits for in-flight messages
///
/// # Errors
///
/// Returns an error if configuration is invalid, a backing service stays
/// unreachable after the start-up retries, or the streams cannot be declared.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let config = AppConfig::from_env().wrap_err("Failed to load configuration")?;
    init_tracing(&config.environment);

    let metrics_handle = init_metrics().wrap_err("Failed to install metrics recorder")?;

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "Starting mail worker service"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = shutdown_signal().await {
                error!(error = %e, "Error waiting for shutdown signal");
            }
            shutdown.cancel();
        }
    });

    let health = HealthState::new(false);
    let health_server =
        HealthServer::new(config.health_port, health.clone()).with_metrics(metrics_handle);
    let health_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = health_server.run(shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }
    });

    let retry = connections::startup_retry();
    let nats = connections::connect_nats(&config.nats, &health, &retry, &shutdown).await?;
    let db = connections::connect_postgres(&config.database, &retry, &shutdown).await?;
    let redis = connections::connect_redis(&config.redis, &retry, &shutdown).await?;

    let jetstream = async_nats::jetstream::new(nats);
    for spec in subjects::streams() {
        ensure_stream(&jetstream, &spec)
            .await
            .wrap_err_with(|| format!("Failed to declare stream {}", spec.name))?;
    }

    let smtp = LettreSmtpClient::new(config.smtp.clone()).wrap_err("Failed to build SMTP client")?;
    info!(host = %config.smtp.host, port = config.smtp.port, "SMTP client configured");

    let metrics: Arc<dyn MetricsRecorder> = Arc::new(PrometheusRecorder::new("email_service"));
    let publisher = Arc::new(JetStreamPublisher::new(jetstream.clone()));
    let usecase = EmailUseCase::new(
        PgEmailRepository::new(db),
        RedisEmailCache::new(redis),
        publisher.clone(),
        smtp,
        metrics.clone(),
    );

    let pool = WorkerPool::new(jetstream, config.pipeline.subscription());
    let subscriber = EmailSubscriber::new(pool, config.pipeline.clone(), usecase, publisher, metrics);
    let subscriptions = subscriber.run(shutdown.clone());
    info!(subscriptions = subscriptions.len(), "Mail worker running");

    shutdown.cancelled().await;
    info!("Shutting down, waiting for in-flight messages...");

    for subscription in subscriptions {
        let subject = subscription.subject().to_string();
        subscription.wait().await;
        info!(subject = %subject, "Workers stopped");
    }
    if let Err(e) = health_task.await {
        error!(error = %e, "Health server task panicked");
    }

    info!("Mail worker service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}

//! Start-up connections to NATS, Postgres and Redis, each retried with a fixed delay.

use core_config::database::DatabaseConfig;
use core_config::nats::NatsConfig;
use core_config::redis::RedisConfig;
use eyre::{Result, WrapErr};
use migration::Migrator;
use nats_worker::{CancellationToken, HealthState, RetryExecutor};
use redis::aio::ConnectionManager;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{info, warn};

/// Retry policy for start-up connections: 5 attempts, 2s apart.
pub fn startup_retry() -> RetryExecutor {
    RetryExecutor::new(5, Duration::from_secs(2))
}

/// Connect to NATS. Connection events keep `health` in sync for `/ready`.
pub async fn connect_nats(
    config: &NatsConfig,
    health: &HealthState,
    retry: &RetryExecutor,
    cancel: &CancellationToken,
) -> Result<async_nats::Client> {
    info!(url = %config.url, "Connecting to NATS...");

    let client = retry
        .run(cancel, || {
            let health = health.clone();
            async_nats::ConnectOptions::new()
                .name(&config.client_name)
                .event_callback(move |event| {
                    let health = health.clone();
                    async move {
                        match event {
                            async_nats::Event::Connected => health.set_broker_connected(true),
                            async_nats::Event::Disconnected => {
                                warn!("NATS connection lost");
                                health.set_broker_connected(false);
                            }
                            other => info!(event = %other, "NATS event"),
                        }
                    }
                })
                .connect(config.url.as_str())
        })
        .await
        .wrap_err_with(|| format!("Failed to connect to NATS at {}", config.url))?;

    health.set_broker_connected(true);
    info!("Connected to NATS");
    Ok(client)
}

/// Connect to Postgres and apply pending migrations.
pub async fn connect_postgres(
    config: &DatabaseConfig,
    retry: &RetryExecutor,
    cancel: &CancellationToken,
) -> Result<DatabaseConnection> {
    let db = retry
        .run(cancel, || {
            let mut options = ConnectOptions::new(config.url.clone());
            options
                .max_connections(20)
                .min_connections(2)
                .connect_timeout(Duration::from_secs(8))
                .acquire_timeout(Duration::from_secs(8))
                .sqlx_logging(false);
            Database::connect(options)
        })
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL");

    Migrator::up(&db, None)
        .await
        .wrap_err("Failed to run migrations")?;
    info!("Migrations applied");

    Ok(db)
}

/// Connect to Redis and verify the connection with PING.
pub async fn connect_redis(
    config: &RedisConfig,
    retry: &RetryExecutor,
    cancel: &CancellationToken,
) -> Result<ConnectionManager> {
    let manager = retry
        .run(cancel, || async {
            let client = redis::Client::open(config.uri.as_str())?;
            let manager = ConnectionManager::new(client).await?;
            let mut conn = manager.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(manager)
        })
        .await
        .wrap_err("Failed to connect to Redis")?;

    info!("Connected to Redis");
    Ok(manager)
}

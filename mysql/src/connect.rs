use std::num::NonZeroI32;
use std::str::FromStr;
use std::time::Duration;

use config::shared::MySqlConnectionConfig;
use secrecy::ExposeSecret;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::{MySqlPool, Row};
use thiserror::Error;
use tracing::info;

use crate::version::extract_server_version;

/// Session time zone. Timestamps are always written in UTC.
const SESSION_TIMEZONE: &str = "+00:00";

/// Character set used by every loader connection.
const SESSION_CHARSET: &str = "utf8mb4";

/// How long a flush may wait for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while turning configuration into connect options.
#[derive(Debug, Error)]
pub enum ConnectOptionsError {
    #[error("invalid connection url: {0}")]
    InvalidUrl(#[source] sqlx::Error),
}

/// Builds [`MySqlConnectOptions`] from the configured url or individual fields.
pub fn connect_options(
    config: &MySqlConnectionConfig,
) -> Result<MySqlConnectOptions, ConnectOptionsError> {
    let mut options = match &config.url {
        Some(url) => MySqlConnectOptions::from_str(url.expose_secret())
            .map_err(ConnectOptionsError::InvalidUrl)?,
        None => {
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user);

            if !config.database.is_empty() {
                options = options.database(&config.database);
            }

            if let Some(password) = &config.password {
                options = options.password(password.expose_secret());
            }

            options
        }
    };

    options = options
        .charset(SESSION_CHARSET)
        .timezone(Some(SESSION_TIMEZONE.to_string()));

    if config.tls.enabled {
        options = options
            .ssl_mode(MySqlSslMode::VerifyCa)
            .ssl_ca_from_pem(config.tls.trusted_root_certs.as_bytes().to_vec());
    }

    Ok(options)
}

/// Connects to the destination database with a bounded pool.
///
/// Each flush borrows one connection for the duration of its transaction, so the pool is
/// sized by the caller from the flush concurrency.
pub async fn connect_to_destination(
    options: MySqlConnectOptions,
    max_connections: u32,
) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;

    info!(max_connections, "connected to destination database");

    Ok(pool)
}

/// Reads and parses the server version of the connected database.
pub async fn server_version(pool: &MySqlPool) -> Result<Option<NonZeroI32>, sqlx::Error> {
    let row = sqlx::query("SELECT CAST(VERSION() AS CHAR) AS version")
        .fetch_one(pool)
        .await?;
    let version: String = row.try_get("version")?;

    Ok(extract_server_version(version))
}

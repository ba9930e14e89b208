use config::shared::{MySqlConnectionConfig, TlsConfig};
use sqlx::{Executor, MySqlPool};
use uuid::Uuid;

use crate::connect::{connect_options, connect_to_destination};
use crate::types::quote_identifier;

/// Builds a connection config for an isolated test database.
///
/// Configuration is read from environment variables:
/// - `TESTS_MYSQL_HOST`: MySQL server hostname (required)
/// - `TESTS_MYSQL_PORT`: MySQL server port (required)
/// - `TESTS_MYSQL_USERNAME`: Database user (required)
/// - `TESTS_MYSQL_PASSWORD`: Database password (optional)
///
/// # Panics
/// Panics if a required variable is missing.
pub fn local_mysql_connection_config() -> MySqlConnectionConfig {
    MySqlConnectionConfig {
        url: None,
        host: std::env::var("TESTS_MYSQL_HOST").expect("TESTS_MYSQL_HOST must be set"),
        port: std::env::var("TESTS_MYSQL_PORT")
            .expect("TESTS_MYSQL_PORT must be set")
            .parse()
            .expect("TESTS_MYSQL_PORT must be a valid port number"),
        user: std::env::var("TESTS_MYSQL_USERNAME").expect("TESTS_MYSQL_USERNAME must be set"),
        password: std::env::var("TESTS_MYSQL_PASSWORD").ok().map(Into::into),
        // Unique database name for test isolation, MySQL identifiers do not allow all uuid
        // characters unquoted so dashes are replaced.
        database: format!("test_{}", Uuid::new_v4().simple()),
        tls: TlsConfig::disabled(),
    }
}

/// Creates the configured database and returns a pool connected to it.
///
/// # Panics
/// Panics if connection or database creation fails.
pub async fn create_mysql_database(config: &MySqlConnectionConfig) -> MySqlPool {
    let mut server_config = config.clone();
    server_config.database = String::new();
    let server_options =
        connect_options(&server_config).expect("Failed to build connect options");

    let server_pool = connect_to_destination(server_options, 1)
        .await
        .expect("Failed to connect to MySQL");
    server_pool
        .execute(&*format!(
            "CREATE DATABASE {}",
            quote_identifier(&config.database)
        ))
        .await
        .expect("Failed to create database");
    server_pool.close().await;

    let options = connect_options(config).expect("Failed to build connect options");
    connect_to_destination(options, 4)
        .await
        .expect("Failed to connect to MySQL database")
}

/// Drops the configured database.
///
/// # Panics
/// Panics if any database operation fails.
pub async fn drop_mysql_database(pool: &MySqlPool, config: &MySqlConnectionConfig) {
    pool.execute(&*format!(
        "DROP DATABASE IF EXISTS {}",
        quote_identifier(&config.database)
    ))
    .await
    .expect("Failed to destroy database");
}

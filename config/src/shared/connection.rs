use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::ValidationError;

/// Connection settings for the destination MySQL server.
///
/// The keys are read flat from the top level of the target configuration, matching the
/// layout Singer targets conventionally accept. When `url` is set it takes precedence over the
/// individual fields.
#[derive(Debug, Clone, Deserialize)]
pub struct MySqlConnectionConfig {
    /// Full `mysql://` connection url.
    #[serde(default)]
    pub url: Option<SecretString>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Database used for the connection and as the default target schema.
    #[serde(default)]
    pub database: String,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl MySqlConnectionConfig {
    /// Default MySQL server port.
    pub const DEFAULT_PORT: u16 = 3306;

    /// Validates connection settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_none() && self.database.is_empty() {
            return Err(ValidationError::MissingDatabase);
        }

        self.tls.validate()
    }
}

impl Config for MySqlConnectionConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub trusted_root_certs: String,
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: "".to_string(),
            enabled: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    MySqlConnectionConfig::DEFAULT_PORT
}

fn default_user() -> String {
    "root".to_string()
}

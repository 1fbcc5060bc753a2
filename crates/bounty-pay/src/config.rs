//! Application configuration loaded from environment variables.

use anyhow::{Context, Result};
use bounty_payments::PaymentConfig;
use serde::Deserialize;

/// Application configuration.
///
/// Nested keys use `__`, e.g. `PAYMENTS__BASE__RPC_URL` or
/// `PAYMENTS__MONITOR__TIMEOUT=10m`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Payment configuration
    #[serde(default)]
    pub payments: PaymentConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let source = config::Environment::default()
            .separator("__")
            // Keep addresses like 0x... as strings.
            .try_parsing(false);

        Self::from_source(source)
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .payments
            .validate()
            .context("Invalid payment configuration")?;
        Ok(config)
    }
}

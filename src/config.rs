//! Application configuration management.
//!
//! Configuration is loaded from environment variables with the `envy` crate,
//! which deserializes them into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `SWEEP_INTERVAL_SECS` (optional): how often the wallet expiry sweeper
///   runs, defaults to once per day
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

/// Default expiry sweep cadence: daily.
fn default_sweep_interval() -> u64 {
    24 * 3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is loaded first if present (ignored otherwise), then
    /// environment variables are deserialized into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}

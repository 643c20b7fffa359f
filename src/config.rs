//! Runtime configuration
//!
//! Loaded from `COHORT_`-prefixed environment variables (and a `.env` file if
//! present), nested with `__`:
//!
//! ```text
//! COHORT_SERVER__ADDR=127.0.0.1:9000
//! COHORT_SERVER__IDENTITY_HEADER=x-forwarded-user
//! COHORT_RETRY__MAX_UNAVAILABLE_RETRIES=5
//! ```

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Transaction retry settings
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Request header carrying the caller's identity
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_identity_header() -> String {
    "x-cohort-user".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            identity_header: default_identity_header(),
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("COHORT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed into its field type.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(environment())
    }

    /// Build configuration from an explicit source, applying defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed into its field type.
    pub fn from_source<T>(source: T) -> Result<Self, config::ConfigError>
    where
        T: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

//! Environment variable names used by this crate for configuring the
//! pipeline without a settings document.
//!
//! These are purely helpers; the registry itself never reads the
//! environment.

use crate::config::StreamsConfig;
use crate::registry::ConfigError;

/// Inline JSON mapping `{target: {enabled, level, ...}}`.
pub const CLIENT_LOG_CONFIG_ENV: &str = "CLIENT_LOG_CONFIG";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Stream configuration from [`CLIENT_LOG_CONFIG_ENV`], or the default one
/// when the variable is unset or empty.
pub fn config_from_env() -> Result<StreamsConfig, ConfigError> {
    let raw = env_or(CLIENT_LOG_CONFIG_ENV, "");
    if raw.trim().is_empty() {
        return Ok(StreamsConfig::default());
    }
    StreamsConfig::from_json(&raw)
}

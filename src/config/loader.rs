//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationIssue};

/// Environment variable overriding `backend.host`.
pub const ENV_BACKEND_HOST: &str = "DOCPROXY_BACKEND_HOST";
/// Environment variable overriding `backend.container`.
pub const ENV_BACKEND_CONTAINER: &str = "DOCPROXY_BACKEND_CONTAINER";
/// Environment variable overriding `listener.bind_address`.
pub const ENV_BIND_ADDRESS: &str = "DOCPROXY_BIND_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;
    finalize(config, |key| std::env::var(key).ok())
}

/// Apply environment overrides on top of `config`, then validate it.
///
/// `lookup` abstracts the environment so overrides can be exercised without
/// touching process state.
pub fn finalize<F>(mut config: ProxyConfig, lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ENV_BACKEND_HOST) {
        config.backend.host = host;
    }
    if let Some(container) = lookup(ENV_BACKEND_CONTAINER) {
        config.backend.container = container;
    }
    if let Some(bind) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = bind;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

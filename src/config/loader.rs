//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::MuxConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "SIMPLE_HTTP_MUX_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    Env { key: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the effective configuration: file (or defaults), then environment
/// overrides, then validation.
pub fn resolve_config(path: Option<&Path>) -> Result<MuxConfig, ConfigError> {
    resolve_config_with(path, |key| std::env::var(key).ok())
}

/// `resolve_config` with an explicit environment lookup.
pub fn resolve_config_with<F>(path: Option<&Path>, lookup: F) -> Result<MuxConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => MuxConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `SIMPLE_HTTP_MUX_*` overrides using the given lookup.
///
/// Timeouts in the environment are whole seconds.
pub fn apply_env_overrides<F>(config: &mut MuxConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| -> Result<Option<u64>, ConfigError> {
        let key = format!("{ENV_PREFIX}{name}");
        match lookup(&key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::Env { key, value }),
        }
    };

    if let Some(port) = read("PORT")? {
        let port = u16::try_from(port).map_err(|_| ConfigError::Env {
            key: format!("{ENV_PREFIX}PORT"),
            value: port.to_string(),
        })?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{host}:{port}");
    }
    if let Some(v) = read("MAX_INCOMING_CONNS")? {
        config.concurrency.max_inbound_connections = v as usize;
    }
    if let Some(v) = read("MAX_URL_PER_REQUEST")? {
        config.concurrency.max_targets_per_request = v as usize;
    }
    if let Some(v) = read("MAX_OUTCOMING_REQUESTS_PER_REQUEST")? {
        config.concurrency.max_outbound_per_request = v as usize;
    }
    if let Some(secs) = read("URL_REQUEST_TIMEOUT")? {
        config.timeouts.target_timeout_ms = secs.saturating_mul(1_000);
    }
    if let Some(secs) = read("REQUEST_HANDLE_TIMEOUT")? {
        config.timeouts.request_timeout_ms = secs.saturating_mul(1_000);
    }

    Ok(())
}

//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{LogFormat, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ServiceConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load configuration from an optional file, falling back to defaults.
pub fn load(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = ServiceConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

/// Overlay `RELAY_*` environment variables onto a configuration.
///
/// `lookup` abstracts the environment so tests do not mutate process state.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("RELAY_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("RELAY_BASE_ORIGIN") {
        config.admission.base_origin = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = lookup("RELAY_DEFAULT_TIMEOUT_MS") {
        config.relay.default_timeout_ms = parse_var("RELAY_DEFAULT_TIMEOUT_MS", v)?;
    }
    if let Some(v) = lookup("RELAY_MAX_TIMEOUT_MS") {
        config.relay.max_timeout_ms = parse_var("RELAY_MAX_TIMEOUT_MS", v)?;
    }
    if let Some(v) = lookup("RELAY_MAX_REQUEST_BYTES") {
        config.relay.max_request_bytes = parse_var("RELAY_MAX_REQUEST_BYTES", v)?;
    }
    if let Some(v) = lookup("RELAY_MAX_RESPONSE_BYTES") {
        config.relay.max_response_bytes = parse_var("RELAY_MAX_RESPONSE_BYTES", v)?;
    }
    if let Some(v) = lookup("RELAY_MAX_REDIRECTS") {
        config.relay.max_redirects = parse_var("RELAY_MAX_REDIRECTS", v)?;
    }
    if let Some(v) = lookup("RELAY_ALLOWED_DOMAINS") {
        config.relay.allowed_domains = v
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(v) = lookup("RELAY_RATE_LIMIT_WINDOW_MS") {
        config.rate_limit.window_ms = parse_var("RELAY_RATE_LIMIT_WINDOW_MS", v)?;
    }
    if let Some(v) = lookup("RELAY_RATE_LIMIT_MAX") {
        config.rate_limit.max_requests = parse_var("RELAY_RATE_LIMIT_MAX", v)?;
    }
    if let Some(v) = lookup("RELAY_LOG_LEVEL") {
        config.observability.log_level = v;
    }
    if let Some(v) = lookup("RELAY_LOG_FORMAT") {
        config.observability.log_format = match v.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => return Err(ConfigError::Env { var: "RELAY_LOG_FORMAT", value: v }),
        };
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

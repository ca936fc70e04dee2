//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, caps > 0)
//! - Check addresses and the base origin parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// Upper bound for `relay.max_timeout_ms` (10 minutes).
pub const MAX_TIMEOUT_CEILING_MS: u64 = 600_000;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    match url::Url::parse(&config.admission.base_origin) {
        Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host().is_some() => {}
        _ => errors.push(ValidationError::new(
            "admission.base_origin",
            format!("'{}' is not an http(s) origin", config.admission.base_origin),
        )),
    }

    let relay = &config.relay;
    if relay.default_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.default_timeout_ms", "must be greater than 0"));
    }
    if relay.max_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.max_timeout_ms", "must be greater than 0"));
    }
    if relay.max_timeout_ms > MAX_TIMEOUT_CEILING_MS {
        errors.push(ValidationError::new(
            "relay.max_timeout_ms",
            format!("must not exceed {MAX_TIMEOUT_CEILING_MS}"),
        ));
    }
    if relay.default_timeout_ms > relay.max_timeout_ms {
        errors.push(ValidationError::new(
            "relay.default_timeout_ms",
            "must not exceed relay.max_timeout_ms",
        ));
    }
    if relay.max_request_bytes == 0 {
        errors.push(ValidationError::new("relay.max_request_bytes", "must be greater than 0"));
    }
    if relay.max_response_bytes == 0 {
        errors.push(ValidationError::new("relay.max_response_bytes", "must be greater than 0"));
    }
    if relay.dns_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.dns_timeout_ms", "must be greater than 0"));
    }
    if relay.allowed_domains.iter().any(|d| d.trim().is_empty()) {
        errors.push(ValidationError::new(
            "relay.allowed_domains",
            "entries must not be empty",
        ));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.enabled {
        if rate_limit.window_ms == 0 {
            errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
        }
        if rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
        }
        if rate_limit.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.sweep_interval_secs",
                "must be greater than 0",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_violation() {
        let mut config = ServiceConfig::default();
        config.relay.default_timeout_ms = 60_000;
        config.relay.max_response_bytes = 0;
        config.admission.base_origin = "ftp://example.com".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "admission.base_origin",
                "relay.default_timeout_ms",
                "relay.max_response_bytes"
            ]
        );
    }

    #[test]
    fn max_timeout_has_a_ceiling() {
        let mut config = ServiceConfig::default();
        config.relay.max_timeout_ms = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "relay.max_timeout_ms");

        config.relay.max_timeout_ms = MAX_TIMEOUT_CEILING_MS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn disabled_rate_limit_skips_its_checks() {
        let mut config = ServiceConfig::default();
        config.rate_limit.enabled = false;
        config.rate_limit.max_requests = 0;
        assert!(validate_config(&config).is_ok());
    }
}

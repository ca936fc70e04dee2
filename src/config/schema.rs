//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Caller admission (origin and content-type checks).
    pub admission: AdmissionConfig,

    /// Outbound relay budgets and policy.
    pub relay: RelayConfig,

    /// Rate limiting for the relay endpoint.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Admission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// The service's own origin. `Origin`/`Referer` of relay calls must match it.
    pub base_origin: String,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            base_origin: "http://localhost:8080".to_string(),
        }
    }
}

/// Outbound relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Timeout applied when the caller does not specify one, in milliseconds.
    pub default_timeout_ms: u64,

    /// Largest timeout a caller may request, in milliseconds.
    pub max_timeout_ms: u64,

    /// Maximum inbound relay request size in bytes.
    pub max_request_bytes: usize,

    /// Maximum upstream response body size in bytes.
    pub max_response_bytes: usize,

    /// Maximum number of redirect hops followed.
    pub max_redirects: u32,

    /// Allowed target domains. Empty means unrestricted.
    pub allowed_domains: Vec<String>,

    /// Name resolution timeout in milliseconds.
    pub dns_timeout_ms: u64,

    /// User-Agent sent upstream.
    pub user_agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            max_timeout_ms: 30_000,
            max_request_bytes: 1024 * 1024,      // 1MB
            max_response_bytes: 5 * 1024 * 1024, // 5MB
            max_redirects: 5,
            allowed_domains: Vec::new(),
            dns_timeout_ms: 5_000,
            user_agent: format!("api-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Rate limiting configuration for the relay endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Length of a counting window in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per caller per window.
    pub max_requests: u32,

    /// Interval between sweeps of expired entries, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max_requests: 30,
            sweep_interval_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

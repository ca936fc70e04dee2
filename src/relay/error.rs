//! Relay error taxonomy and its HTTP mapping.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// A structural problem with the relay payload, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid field '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Why a target was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsrfReason {
    InvalidUrl(String),
    BlockedHost(String),
    PrivateAddress { host: String },
    DnsResolutionFailed { host: String },
    DomainNotAllowed(String),
}

impl SsrfReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SsrfReason::InvalidUrl(_) => "invalid_url",
            SsrfReason::BlockedHost(_) => "blocked_host",
            SsrfReason::PrivateAddress { .. } => "private_address",
            SsrfReason::DnsResolutionFailed { .. } => "dns_failed",
            SsrfReason::DomainNotAllowed(_) => "domain_not_allowed",
        }
    }
}

impl fmt::Display for SsrfReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsrfReason::InvalidUrl(detail) => write!(f, "Invalid target URL: {detail}"),
            SsrfReason::BlockedHost(host) => write!(f, "Blocked hostname: {host}"),
            SsrfReason::PrivateAddress { host } => {
                write!(f, "Target {host} resolves to a private or reserved address")
            }
            SsrfReason::DnsResolutionFailed { host } => {
                write!(f, "DNS resolution failed for {host}")
            }
            SsrfReason::DomainNotAllowed(host) => {
                write!(f, "Domain {host} is not in the allowed domains list")
            }
        }
    }
}

/// Where in the hop chain a rejection happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrfStage {
    Initial,
    Redirect { hop: u32 },
}

impl SsrfStage {
    pub fn label(&self) -> &'static str {
        match self {
            SsrfStage::Initial => "initial",
            SsrfStage::Redirect { .. } => "redirect",
        }
    }
}

/// Errors produced while relaying a call.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{}", ssrf_message(.reason, .stage))]
    Ssrf { reason: SsrfReason, stage: SsrfStage },

    #[error("Upstream request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Too many redirects (max {max})")]
    TooManyRedirects { max: u32 },

    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },

    /// A defect inside the relay. The detail is logged, never returned.
    #[error("Internal relay error: {0}")]
    Internal(String),
}

fn ssrf_message(reason: &SsrfReason, stage: &SsrfStage) -> String {
    match stage {
        SsrfStage::Initial => reason.to_string(),
        SsrfStage::Redirect { hop } => format!("Redirect blocked (hop {hop}): {reason}"),
    }
}

impl RelayError {
    pub fn ssrf(reason: SsrfReason, stage: SsrfStage) -> Self {
        RelayError::Ssrf { reason, stage }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) | RelayError::Ssrf { .. } => StatusCode::BAD_REQUEST,
            RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::UpstreamUnreachable(_)
            | RelayError::TooManyRedirects { .. }
            | RelayError::ResponseTooLarge { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "invalid",
            RelayError::Ssrf { .. } => "ssrf_blocked",
            RelayError::Timeout { .. } => "timeout",
            RelayError::UpstreamUnreachable(_) => "unreachable",
            RelayError::TooManyRedirects { .. } => "too_many_redirects",
            RelayError::ResponseTooLarge { .. } => "too_large",
            RelayError::Internal(_) => "internal",
        }
    }

    /// The message shown to the caller.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if let RelayError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Relay defect");
        }
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let private = RelayError::ssrf(
            SsrfReason::PrivateAddress { host: "127.0.0.1".into() },
            SsrfStage::Initial,
        );
        assert_eq!(private.status(), StatusCode::BAD_REQUEST);
        assert!(private.to_string().contains("private"));

        assert_eq!(RelayError::Timeout { timeout_ms: 5 }.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(RelayError::TooManyRedirects { max: 5 }.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            RelayError::ResponseTooLarge { limit: 10 }.status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn redirect_stage_is_named() {
        let err = RelayError::ssrf(
            SsrfReason::PrivateAddress { host: "internal.example.com".into() },
            SsrfStage::Redirect { hop: 2 },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Redirect blocked (hop 2)"));
        assert!(msg.contains("private"));
    }

    #[test]
    fn internal_detail_is_hidden() {
        let err = RelayError::Internal("header builder panicked".into());
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn too_many_redirects_names_limit() {
        assert_eq!(
            RelayError::TooManyRedirects { max: 3 }.to_string(),
            "Too many redirects (max 3)"
        );
    }
}

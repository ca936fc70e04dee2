//! Admission checks for relay callers.
//! Only the service's own pages may use the relay.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::ServiceConfig;

/// Shared configuration handle read by the admission middleware.
#[derive(Clone)]
pub struct AdmissionState {
    pub config: Arc<ArcSwap<ServiceConfig>>,
}

/// Why a caller was turned away before its payload was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    ContentType,
    Origin,
    TooLarge { limit: usize },
}

impl AdmissionError {
    fn status(&self) -> StatusCode {
        match self {
            AdmissionError::ContentType | AdmissionError::Origin => StatusCode::FORBIDDEN,
            AdmissionError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn message(&self) -> String {
        match self {
            AdmissionError::ContentType => "Content-Type must be application/json".to_string(),
            AdmissionError::Origin => {
                "Requests must originate from this service's own pages".to_string()
            }
            AdmissionError::TooLarge { limit } => {
                format!("Request body exceeds the {limit} byte limit")
            }
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Run every admission check against request headers.
pub fn check_headers(
    headers: &HeaderMap,
    base_origin: &str,
    max_request_bytes: usize,
) -> Result<(), AdmissionError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(AdmissionError::ContentType);
    }

    if !origin_matches(headers, base_origin) {
        return Err(AdmissionError::Origin);
    }

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(len) = declared {
        if len > max_request_bytes as u64 {
            return Err(AdmissionError::TooLarge {
                limit: max_request_bytes,
            });
        }
    }

    Ok(())
}

/// `Origin` must equal the base origin; without `Origin`, `Referer` must start with it.
fn origin_matches(headers: &HeaderMap, base_origin: &str) -> bool {
    let base = base_origin.trim_end_matches('/');
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        return origin.trim_end_matches('/').eq_ignore_ascii_case(base);
    }
    match headers.get(header::REFERER).and_then(|v| v.to_str().ok()) {
        Some(referer) => {
            referer
                .get(..base.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(base))
                && matches!(referer.as_bytes().get(base.len()), None | Some(b'/'))
        }
        None => false,
    }
}

pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load();
    match check_headers(
        request.headers(),
        &config.admission.base_origin,
        config.relay.max_request_bytes,
    ) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            tracing::warn!(reason = ?rejection, "Relay caller rejected");
            rejection.into_response()
        }
    }
}

//! Structural validation of relay payloads.
//!
//! Checks run in a fixed order and stop at the first failure; each failure
//! names the offending field path. A payload that passes is returned as a
//! typed [`RelayRequest`].

use serde_json::{Map, Value};
use url::Url;

use crate::relay::error::ValidationError;
use crate::relay::types::{AuthSpec, RelayMethod, RelayRequest};
use crate::security::headers::is_reserved_header;

/// Validate a decoded JSON payload against the relay schema.
pub fn validate(payload: &Value, max_timeout_ms: u64) -> Result<RelayRequest, ValidationError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ValidationError::new("body", "Request body must be a JSON object"))?;

    let url = validate_url(obj)?;
    let method = validate_method(obj)?;
    let timeout_ms = validate_timeout(obj, max_timeout_ms)?;
    let content_type = optional_string(obj, "contentType")?;
    let accept = optional_string(obj, "accept")?;
    let auth = match obj.get("auth") {
        None | Some(Value::Null) => None,
        Some(auth) => Some(validate_auth(auth)?),
    };

    Ok(RelayRequest {
        url,
        method,
        body: obj.get("body").filter(|b| !b.is_null()).cloned(),
        timeout_ms,
        content_type,
        accept,
        auth,
    })
}

fn validate_url(obj: &Map<String, Value>) -> Result<Url, ValidationError> {
    let raw = match obj.get("url") {
        None | Some(Value::Null) => return Err(ValidationError::new("url", "url is required")),
        Some(Value::String(s)) => s,
        Some(_) => return Err(ValidationError::new("url", "url must be a string")),
    };

    let url = Url::parse(raw)
        .map_err(|e| ValidationError::new("url", format!("url is not a valid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ValidationError::new(
            "url",
            format!("url scheme '{other}' is not allowed; use http or https"),
        )),
    }
}

fn validate_method(obj: &Map<String, Value>) -> Result<RelayMethod, ValidationError> {
    match obj.get("method") {
        None | Some(Value::Null) => Ok(RelayMethod::default()),
        Some(Value::String(s)) => RelayMethod::parse(s).ok_or_else(|| {
            ValidationError::new(
                "method",
                "method must be one of GET, POST, PUT, PATCH, DELETE, HEAD",
            )
        }),
        Some(_) => Err(ValidationError::new("method", "method must be a string")),
    }
}

fn validate_timeout(
    obj: &Map<String, Value>,
    max_timeout_ms: u64,
) -> Result<Option<u64>, ValidationError> {
    let value = match obj.get("timeoutMs") {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };

    let ms = value
        .as_f64()
        .filter(|ms| ms.is_finite())
        .ok_or_else(|| ValidationError::new("timeoutMs", "timeoutMs must be a number"))?;

    if ms <= 0.0 {
        return Err(ValidationError::new("timeoutMs", "timeoutMs must be positive"));
    }
    if ms > max_timeout_ms as f64 {
        return Err(ValidationError::new(
            "timeoutMs",
            format!("timeoutMs must not exceed {max_timeout_ms}"),
        ));
    }

    Ok(Some(ms.ceil() as u64))
}

fn optional_string(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::new(field, format!("{field} must be a string"))),
    }
}

fn validate_auth(value: &Value) -> Result<AuthSpec, ValidationError> {
    let auth = value
        .as_object()
        .ok_or_else(|| ValidationError::new("auth", "auth must be an object"))?;

    let kind = match auth.get("type") {
        Some(Value::String(s)) if matches!(s.as_str(), "bearer" | "basic" | "api-key") => s,
        _ => {
            return Err(ValidationError::new(
                "auth.type",
                "auth.type must be one of bearer, basic, api-key",
            ))
        }
    };

    let credentials = match auth.get("credentials") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(ValidationError::new(
                "auth.credentials",
                "auth.credentials must be a non-empty string",
            ))
        }
    };

    match kind.as_str() {
        "bearer" => Ok(AuthSpec::Bearer { credentials }),
        "basic" => Ok(AuthSpec::Basic { credentials }),
        _ => {
            let header_name = match auth.get("headerName") {
                None | Some(Value::Null) => None,
                Some(Value::String(name)) if !name.is_empty() => {
                    if is_reserved_header(name) {
                        return Err(ValidationError::new(
                            "auth.headerName",
                            format!("auth.headerName '{name}' is a reserved header"),
                        ));
                    }
                    if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
                        return Err(ValidationError::new(
                            "auth.headerName",
                            "auth.headerName is not a valid header name",
                        ));
                    }
                    Some(name.clone())
                }
                Some(_) => {
                    return Err(ValidationError::new(
                        "auth.headerName",
                        "auth.headerName must be a non-empty string",
                    ))
                }
            };
            Ok(AuthSpec::ApiKey {
                credentials,
                header_name,
            })
        }
    }
}

//! Response sanitization.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::relay::types::{RelayBody, RelayResponse};
use crate::security::headers::is_stripped_response_header;

/// Build the caller-facing response from upstream parts.
///
/// Cookies are dropped; a JSON content type is parsed when possible and the
/// raw text is returned otherwise. `reason` is the upstream's own reason
/// phrase, when it sent one that differs from the canonical text.
pub fn sanitize(
    status: StatusCode,
    reason: Option<&str>,
    headers: &HeaderMap,
    text: String,
) -> RelayResponse {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if is_stripped_response_header(name.as_str()) {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);

    let body = if is_json {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => RelayBody::Json(value),
            Err(_) => RelayBody::Text(text),
        }
    } else {
        RelayBody::Text(text)
    };

    RelayResponse {
        status: status.as_u16(),
        status_text: reason
            .or_else(|| status.canonical_reason())
            .unwrap_or_default()
            .to_string(),
        headers: out,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn strips_cookies_and_keeps_the_rest() {
        let h = headers(&[
            ("set-cookie", "session=abc"),
            ("set-cookie", "other=def"),
            ("x-ratelimit-remaining", "41"),
            ("cache-control", "no-cache"),
            ("cache-control", "private"),
        ]);
        let resp = sanitize(StatusCode::OK, None, &h, String::new());

        assert!(!resp.headers.contains_key("set-cookie"));
        assert_eq!(resp.headers["x-ratelimit-remaining"], "41");
        assert_eq!(resp.headers["cache-control"], "no-cache, private");
        assert_eq!(resp.status_text, "OK");
    }

    #[test]
    fn parses_json_bodies() {
        let h = headers(&[("content-type", "application/json; charset=utf-8")]);
        let resp = sanitize(StatusCode::CREATED, None, &h, r#"{"id":7}"#.to_string());
        assert_eq!(resp.body, RelayBody::Json(json!({"id": 7})));
        assert_eq!(resp.status, 201);
    }

    #[test]
    fn malformed_json_falls_back_to_text() {
        let h = headers(&[("content-type", "application/json")]);
        let resp = sanitize(StatusCode::OK, None, &h, "{not json".to_string());
        assert_eq!(resp.body, RelayBody::Text("{not json".to_string()));
    }

    #[test]
    fn non_json_is_text() {
        let h = headers(&[("content-type", "text/html")]);
        let resp = sanitize(StatusCode::OK, None, &h, r#"{"looks":"like json"}"#.to_string());
        assert!(matches!(resp.body, RelayBody::Text(_)));
    }

    #[test]
    fn upstream_reason_phrase_wins() {
        let h = HeaderMap::new();
        let custom = StatusCode::from_u16(299).unwrap();
        assert_eq!(sanitize(custom, None, &h, String::new()).status_text, "");
        assert_eq!(
            sanitize(custom, Some("Custom Thing"), &h, String::new()).status_text,
            "Custom Thing"
        );
        assert_eq!(sanitize(StatusCode::NOT_FOUND, None, &h, String::new()).status_text, "Not Found");
    }
}

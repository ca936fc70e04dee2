//! Request-scoped relay data types.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// HTTP verbs the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl RelayMethod {
    /// Parse a verb case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            _ => None,
        }
    }

    /// GET and HEAD never carry a body upstream.
    pub fn allows_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }

    pub fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
            Self::Head => Method::HEAD,
        }
    }
}

impl fmt::Display for RelayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

/// Default header used for `api-key` auth without an explicit `headerName`.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Caller-specified upstream authentication.
///
/// Consumed once to build exactly one outgoing header; never logged.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthSpec {
    Bearer { credentials: String },
    /// Credentials are already base64-encoded by the caller.
    Basic { credentials: String },
    ApiKey {
        credentials: String,
        header_name: Option<String>,
    },
}

impl AuthSpec {
    /// The single `(name, value)` header this auth produces.
    pub fn header(&self) -> (String, String) {
        match self {
            AuthSpec::Bearer { credentials } => {
                ("Authorization".to_string(), format!("Bearer {credentials}"))
            }
            AuthSpec::Basic { credentials } => {
                ("Authorization".to_string(), format!("Basic {credentials}"))
            }
            AuthSpec::ApiKey {
                credentials,
                header_name,
            } => (
                header_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
                credentials.clone(),
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthSpec::Bearer { .. } => "bearer",
            AuthSpec::Basic { .. } => "basic",
            AuthSpec::ApiKey { .. } => "api-key",
        }
    }
}

impl fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("AuthSpec");
        s.field("type", &self.kind()).field("credentials", &"<redacted>");
        if let AuthSpec::ApiKey { header_name, .. } = self {
            s.field("header_name", header_name);
        }
        s.finish()
    }
}

/// A structurally valid relay request.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub url: Url,
    pub method: RelayMethod,
    pub body: Option<Value>,
    pub timeout_ms: Option<u64>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub auth: Option<AuthSpec>,
}

impl RelayRequest {
    /// A bodyless GET, the shape every redirect hop takes.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: RelayMethod::Get,
            body: None,
            timeout_ms: None,
            content_type: None,
            accept: None,
            auth: None,
        }
    }

    /// The upstream payload, if the method carries one.
    ///
    /// String values are forwarded verbatim; anything else is JSON-encoded.
    pub fn outgoing_body(&self) -> Option<Vec<u8>> {
        if !self.method.allows_body() {
            return None;
        }
        match self.body.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone().into_bytes()),
            other => Some(other.to_string().into_bytes()),
        }
    }
}

/// A validated network destination, produced fresh for every hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub hostname: String,
    pub resolved_ip: IpAddr,
}

/// Upstream body as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelayBody {
    Json(Value),
    Text(String),
}

/// The sanitized upstream response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: RelayBody,
}

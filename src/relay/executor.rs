//! Outbound call execution.
//!
//! # Responsibilities
//! - Build upstream headers, injecting exactly one auth header
//! - Issue the call with transport-level redirects disabled
//! - Follow redirects manually, re-validating every hop
//! - Read the body under a byte cap and a single deadline
//!
//! # Design Decisions
//! - One deadline covers the initial lookup, every hop and every body chunk
//! - Redirect hops are always refetched with GET and no body
//! - The auth header is only sent to the origin the caller named
//! - No retries; each hop is attempted once

use std::time::Duration;

use futures_util::StreamExt;
use hyper::ext::ReasonPhrase;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LOCATION,
    USER_AGENT,
};
use reqwest::{redirect, Client, Response, StatusCode};
use tokio::time::{timeout_at, Instant};
use url::Url;

use crate::config::RelayConfig;
use crate::observability::metrics;
use crate::relay::error::{RelayError, SsrfReason, SsrfStage, ValidationError};
use crate::relay::resolver::{DomainAllowlist, TargetResolver};
use crate::relay::sanitizer::sanitize;
use crate::relay::types::{RelayMethod, RelayRequest, RelayResponse, ResolvedTarget};

const REDIRECT_STATUSES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// Performs relayed calls. The only component that talks to upstreams.
#[derive(Clone)]
pub struct RelayExecutor {
    client: Client,
    resolver: TargetResolver,
}

impl RelayExecutor {
    /// Create an executor with its own HTTP client.
    pub fn new(resolver: TargetResolver) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { client, resolver })
    }

    /// Create an executor around an existing client.
    ///
    /// The client must be built with `redirect::Policy::none()`.
    pub fn with_client(client: Client, resolver: TargetResolver) -> Self {
        Self { client, resolver }
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    async fn check_target(
        &self,
        url: &Url,
        allowlist: &DomainAllowlist,
        stage: SsrfStage,
    ) -> Result<ResolvedTarget, RelayError> {
        let checked = match allowlist.check(url) {
            Ok(()) => self.resolver.resolve_and_validate(url).await,
            Err(reason) => Err(reason),
        };
        checked.map_err(|reason| {
            tracing::warn!(
                host = url.host_str().unwrap_or_default(),
                stage = stage.label(),
                reason = %reason,
                "Target rejected"
            );
            metrics::record_ssrf_block(reason.label(), stage.label());
            RelayError::ssrf(reason, stage)
        })
    }

    /// Check the caller's target, then fetch it, following redirects.
    ///
    /// The deadline starts before the first name lookup.
    pub async fn execute(
        &self,
        request: &RelayRequest,
        config: &RelayConfig,
    ) -> Result<RelayResponse, RelayError> {
        let timeout_ms = request.timeout_ms.unwrap_or(config.default_timeout_ms);
        let deadline = Instant::now()
            .checked_add(Duration::from_millis(timeout_ms))
            .ok_or_else(|| RelayError::Internal(format!("deadline overflow for {timeout_ms}ms")))?;
        let allowlist = DomainAllowlist::new(&config.allowed_domains);

        let target = timeout_at(
            deadline,
            self.check_target(&request.url, &allowlist, SsrfStage::Initial),
        )
        .await
        .map_err(|_| RelayError::Timeout { timeout_ms })??;
        tracing::debug!(
            host = %target.hostname,
            ip = %target.resolved_ip,
            method = %request.method,
            auth = request.auth.as_ref().map(|a| a.kind()).unwrap_or("none"),
            "Relaying request"
        );

        let origin = request.url.origin();
        let mut current_url = request.url.clone();
        let mut hops: u32 = 0;

        let response = loop {
            let first_hop = hops == 0;
            let hop_request = if first_hop {
                request.clone()
            } else {
                let mut next = RelayRequest::get(current_url.clone());
                next.accept = request.accept.clone();
                if current_url.origin() == origin {
                    next.auth = request.auth.clone();
                }
                next
            };

            let response = self
                .send(&hop_request, config, deadline, timeout_ms)
                .await?;
            let status = response.status();

            tracing::debug!(
                host = current_url.host_str().unwrap_or_default(),
                hop = hops,
                status = status.as_u16(),
                "Upstream responded"
            );

            if !REDIRECT_STATUSES.contains(&status) {
                break (response, hop_request.method);
            }
            let location = response.headers().get(LOCATION).cloned();
            let Some(location) = location else {
                break (response, hop_request.method);
            };

            let stage = SsrfStage::Redirect { hop: hops + 1 };
            let next_url = location
                .to_str()
                .ok()
                .and_then(|loc| current_url.join(loc).ok())
                .ok_or_else(|| {
                    RelayError::ssrf(
                        SsrfReason::InvalidUrl("redirect Location could not be resolved".to_string()),
                        stage,
                    )
                })?;

            timeout_at(deadline, self.check_target(&next_url, &allowlist, stage))
                .await
                .map_err(|_| RelayError::Timeout { timeout_ms })??;

            hops += 1;
            metrics::record_redirect();
            if hops > config.max_redirects {
                tracing::warn!(max = config.max_redirects, "Redirect limit exceeded");
                return Err(RelayError::TooManyRedirects {
                    max: config.max_redirects,
                });
            }
            current_url = next_url;
        };

        let (response, final_method) = response;
        let status = response.status();
        let headers = response.headers().clone();
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok())
            .map(str::to_string);
        let text = read_body(
            response,
            final_method,
            config.max_response_bytes,
            deadline,
            timeout_ms,
        )
        .await?;

        Ok(sanitize(status, reason.as_deref(), &headers, text))
    }

    async fn send(
        &self,
        request: &RelayRequest,
        config: &RelayConfig,
        deadline: Instant,
        timeout_ms: u64,
    ) -> Result<Response, RelayError> {
        let body = request.outgoing_body();
        let headers = build_headers(request, &config.user_agent, body.is_some())?;

        let mut builder = self
            .client
            .request(request.method.as_method(), request.url.clone())
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        match timeout_at(deadline, builder.send()).await {
            Err(_) => Err(RelayError::Timeout { timeout_ms }),
            Ok(Err(e)) if e.is_timeout() => Err(RelayError::Timeout { timeout_ms }),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Upstream request failed");
                Err(RelayError::UpstreamUnreachable(e.without_url().to_string()))
            }
            Ok(Ok(response)) => Ok(response),
        }
    }
}

/// Build outgoing headers for one hop.
pub fn build_headers(
    request: &RelayRequest,
    user_agent: &str,
    has_body: bool,
) -> Result<HeaderMap, ValidationError> {
    let mut headers = HeaderMap::new();

    let ua = HeaderValue::from_str(user_agent)
        .unwrap_or_else(|_| HeaderValue::from_static("api-relay"));
    headers.insert(USER_AGENT, ua);

    match (&request.content_type, has_body) {
        (Some(ct), _) => {
            headers.insert(CONTENT_TYPE, header_value("contentType", ct)?);
        }
        (None, true) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        (None, false) => {}
    }

    if let Some(accept) = &request.accept {
        headers.insert(ACCEPT, header_value("accept", accept)?);
    }

    if let Some(auth) = &request.auth {
        let (name, value) = auth.header();
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ValidationError::new("auth.headerName", "auth.headerName is not a valid header name")
        })?;
        let mut value = header_value("auth.credentials", &value)?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(headers)
}

fn header_value(field: &str, raw: &str) -> Result<HeaderValue, ValidationError> {
    HeaderValue::from_str(raw)
        .map_err(|_| ValidationError::new(field, format!("{field} contains invalid header characters")))
}

/// Read the response body under a byte cap.
///
/// Bytes are accumulated and decoded once, so multi-byte characters split
/// across chunks decode correctly. The stream is dropped (closing the
/// connection) as soon as the cap is crossed.
async fn read_body(
    response: Response,
    method: RelayMethod,
    limit: usize,
    deadline: Instant,
    timeout_ms: u64,
) -> Result<String, RelayError> {
    if method != RelayMethod::Head {
        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(len) = declared {
            if len > limit as u64 {
                tracing::warn!(declared = len, limit, "Upstream declared oversized body");
                return Err(RelayError::ResponseTooLarge { limit });
            }
        }
    }

    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    loop {
        let next = timeout_at(deadline, stream.next())
            .await
            .map_err(|_| RelayError::Timeout { timeout_ms })?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout { timeout_ms }
            } else {
                RelayError::UpstreamUnreachable(format!(
                    "failed to read upstream response: {}",
                    e.without_url()
                ))
            }
        })?;

        if body.len() + chunk.len() > limit {
            tracing::warn!(limit, "Upstream body exceeded limit, aborting read");
            return Err(RelayError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    metrics::record_response_bytes(body.len());
    Ok(String::from_utf8_lossy(&body).into_owned())
}

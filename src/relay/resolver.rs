//! Target resolution and validation.
//!
//! # Responsibilities
//! - Reject non-http(s) URLs and blocklisted hostnames
//! - Resolve hostnames to a concrete address (A first, AAAA as fallback)
//! - Classify the address and refuse private/reserved targets
//! - Enforce the optional domain allowlist
//!
//! # Design Decisions
//! - Every hop resolves fresh; nothing is cached across requests
//! - Any resolution failure is terminal, never retried
//! - The validated address is not pinned into the connection; a narrow
//!   rebinding window between check and connect remains

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::{Host, Url};

use crate::relay::classifier::{is_blocked_hostname, is_private_ip};
use crate::relay::error::SsrfReason;
use crate::relay::types::ResolvedTarget;

/// Name resolution seam.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Resolve a hostname; IPv4 results come before IPv6 results.
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        let (v4, v6): (Vec<IpAddr>, Vec<IpAddr>) =
            addrs.map(|addr| addr.ip()).partition(IpAddr::is_ipv4);
        Ok(v4.into_iter().chain(v6).collect())
    }
}

/// Fixed host table, for tests and offline deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, ip: IpAddr) -> Self {
        self.entries
            .entry(host.to_ascii_lowercase())
            .or_default()
            .push(ip);
        self
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.entries
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
    }
}

/// Resolves URLs to validated targets.
#[derive(Clone)]
pub struct TargetResolver {
    dns: Arc<dyn DnsResolver>,
    dns_timeout: Duration,
}

impl TargetResolver {
    pub fn new(dns: Arc<dyn DnsResolver>, dns_timeout: Duration) -> Self {
        Self { dns, dns_timeout }
    }

    /// Use the system resolver.
    pub fn system(dns_timeout: Duration) -> Self {
        Self::new(Arc::new(SystemResolver), dns_timeout)
    }

    /// Parse and validate a raw URL string.
    pub async fn resolve_str(&self, raw: &str) -> Result<ResolvedTarget, SsrfReason> {
        let url = Url::parse(raw).map_err(|e| SsrfReason::InvalidUrl(e.to_string()))?;
        self.resolve_and_validate(&url).await
    }

    /// Validate a URL's scheme and host, then resolve and classify it.
    pub async fn resolve_and_validate(&self, url: &Url) -> Result<ResolvedTarget, SsrfReason> {
        check_scheme(url)?;

        let host = url
            .host()
            .ok_or_else(|| SsrfReason::InvalidUrl("URL has no host".to_string()))?;

        let (hostname, ip) = match host {
            Host::Ipv4(v4) => (v4.to_string(), IpAddr::V4(v4)),
            Host::Ipv6(v6) => (v6.to_string(), IpAddr::V6(v6)),
            Host::Domain(domain) => {
                if is_blocked_hostname(domain) {
                    return Err(SsrfReason::BlockedHost(domain.to_string()));
                }
                (domain.to_string(), self.lookup_first(domain).await?)
            }
        };

        if is_private_ip(ip) {
            tracing::warn!(host = %hostname, ip = %ip, "Refusing private target");
            return Err(SsrfReason::PrivateAddress { host: hostname });
        }

        Ok(ResolvedTarget {
            hostname,
            resolved_ip: ip,
        })
    }

    async fn lookup_first(&self, domain: &str) -> Result<IpAddr, SsrfReason> {
        let failed = || SsrfReason::DnsResolutionFailed {
            host: domain.to_string(),
        };

        let addrs = match tokio::time::timeout(self.dns_timeout, self.dns.lookup(domain)).await {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                tracing::debug!(host = %domain, error = %e, "DNS lookup failed");
                return Err(failed());
            }
            Err(_) => {
                tracing::debug!(host = %domain, "DNS lookup timed out");
                return Err(failed());
            }
        };

        addrs.first().copied().ok_or_else(failed)
    }
}

fn check_scheme(url: &Url) -> Result<(), SsrfReason> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SsrfReason::InvalidUrl(format!(
            "scheme '{other}' not allowed; only http and https are supported"
        ))),
    }
}

/// Optional allowlist of target domains.
#[derive(Debug, Clone, Default)]
pub struct DomainAllowlist {
    domains: Vec<String>,
}

impl DomainAllowlist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// An empty allowlist admits every host.
    pub fn is_unrestricted(&self) -> bool {
        self.domains.is_empty()
    }

    /// Exact or subdomain match, case-insensitive.
    pub fn allows(&self, host: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }

    /// Check a URL's host against the allowlist.
    pub fn check(&self, url: &Url) -> Result<(), SsrfReason> {
        if self.is_unrestricted() {
            return Ok(());
        }
        let host = url.host_str().unwrap_or_default();
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if self.allows(host) {
            Ok(())
        } else {
            Err(SsrfReason::DomainNotAllowed(host.to_string()))
        }
    }
}

//! Per-caller rate limiting for the relay endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::broadcast;

use crate::config::{RateLimitConfig, ServiceConfig};
use crate::observability::metrics;

/// Counter for one caller's current window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Fixed-window counters keyed by caller identity.
///
/// Increments for one key happen under that key's shard lock, so concurrent
/// requests from the same caller never lose an update.
#[derive(Debug, Default)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request for `key` and decide whether to admit it.
    pub fn check(&self, key: &str, max_requests: u32, window: Duration) -> RateLimitDecision {
        self.check_at(key, max_requests, window, Instant::now())
    }

    fn check_at(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
        now: Instant,
    ) -> RateLimitDecision {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_at: now + window,
            });

        if entry.reset_at <= now {
            *entry = RateLimitEntry {
                count: 0,
                reset_at: now + window,
            };
        }

        let allowed = entry.count < max_requests;
        if allowed {
            entry.count += 1;
        }

        RateLimitDecision {
            allowed,
            limit: max_requests,
            remaining: max_requests.saturating_sub(entry.count),
            reset_after: entry.reset_at.saturating_duration_since(now),
        }
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run [`RateLimiter::sweep`] on a fixed interval until shutdown.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = limiter.len(), "Swept expired rate-limit entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate-limit sweeper exiting");
                    break;
                }
            }
        }
    })
}

/// State handed to [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<ArcSwap<ServiceConfig>>,
}

/// Identify the caller by peer IP.
fn caller_key(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let reset_secs = decision.reset_after.as_secs_f64().ceil() as u64;
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_secs));
    if !decision.allowed {
        headers.insert("retry-after", HeaderValue::from(reset_secs.max(1)));
    }
}

/// Middleware enforcing the relay endpoint's own request budget.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load();
    let limits: &RateLimitConfig = &config.rate_limit;
    if !limits.enabled {
        return next.run(request).await;
    }

    let key = caller_key(&request);
    let decision = state.limiter.check(
        &key,
        limits.max_requests,
        Duration::from_millis(limits.window_ms),
    );

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Too many relay requests, please try again later" })),
        )
            .into_response()
    };

    apply_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for i in 0..3 {
            let d = limiter.check_at("1.2.3.4", 3, WINDOW, now);
            assert!(d.allowed);
            assert_eq!(d.remaining, 2 - i);
        }
        let d = limiter.check_at("1.2.3.4", 3, WINDOW, now);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_after, WINDOW);

        // other callers are independent
        assert!(limiter.check_at("5.6.7.8", 3, WINDOW, now).allowed);
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        assert!(limiter.check_at("k", 1, WINDOW, now).allowed);
        assert!(!limiter.check_at("k", 1, WINDOW, now + Duration::from_secs(30)).allowed);
        assert!(limiter.check_at("k", 1, WINDOW, now + WINDOW).allowed);
    }

    #[test]
    fn sweep_only_removes_elapsed_windows() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        limiter.check_at("old", 5, Duration::from_secs(1), now);
        limiter.check_at("fresh", 5, WINDOW, now);

        assert_eq!(limiter.sweep_at(now + Duration::from_secs(2)), 1);
        assert_eq!(limiter.len(), 1);
        // swept caller simply starts a new window
        let d = limiter.check_at("old", 5, Duration::from_secs(1), now + Duration::from_secs(2));
        assert_eq!(d.remaining, 4);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let limiter = Arc::new(RateLimiter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check("shared", 200, WINDOW).allowed)
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 200);
    }

    #[test]
    fn headers_on_rejection() {
        let mut headers = HeaderMap::new();
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_after: Duration::from_millis(1500),
        };
        apply_headers(&mut headers, &decision);
        assert_eq!(headers["x-ratelimit-limit"], "10");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "2");
        assert_eq!(headers["retry-after"], "2");
    }
}

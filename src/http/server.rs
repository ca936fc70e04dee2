//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the relay and health handlers
//! - Wire up middleware (request ID, tracing, panic catching)
//! - Wire up the relay endpoint's rate limiter and admission gate
//! - Apply hot-reloaded configuration
//! - Serve until shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::observability::metrics;
use crate::relay::{validate, RelayError, RelayExecutor, RelayResponse, TargetResolver, ValidationError};
use crate::security::admission::{admission_middleware, AdmissionError, AdmissionState};
use crate::security::rate_limit::{rate_limit_middleware, spawn_sweeper, RateLimitState, RateLimiter};

/// Relay endpoint path.
pub const RELAY_PATH: &str = "/api/relay";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<ServiceConfig>>,
    pub executor: RelayExecutor,
    pub limiter: Arc<RateLimiter>,
}

/// HTTP server for the relay service.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server that resolves names through the operating system.
    pub fn new(config: ServiceConfig) -> Result<Self, reqwest::Error> {
        let resolver = TargetResolver::system(Duration::from_millis(config.relay.dns_timeout_ms));
        let executor = RelayExecutor::new(resolver)?;
        Ok(Self::with_executor(config, executor))
    }

    /// Create a server around a prepared executor.
    pub fn with_executor(config: ServiceConfig, executor: RelayExecutor) -> Self {
        let state = AppState {
            config: Arc::new(ArcSwap::from_pointee(config)),
            executor,
            limiter: Arc::new(RateLimiter::new()),
        };
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let rate_state = RateLimitState {
            limiter: state.limiter.clone(),
            config: state.config.clone(),
        };
        let admission_state = AdmissionState {
            config: state.config.clone(),
        };

        let relay_routes = Router::new()
            .route(RELAY_PATH, post(relay_handler))
            .layer(middleware::from_fn_with_state(admission_state, admission_middleware))
            .layer(middleware::from_fn_with_state(rate_state, rate_limit_middleware));

        Router::new()
            .route("/health", get(health_handler))
            .merge(relay_routes)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(
                        TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request.headers().request_id(),
                            )
                        }),
                    )
                    .layer(propagate_request_id_layer())
                    .layer(CatchPanicLayer::custom(handle_panic)),
            )
    }

    /// The router, for driving the service without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<ServiceConfig> {
        self.state.config.load_full()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweep_every = Duration::from_secs(
            self.state.config.load().rate_limit.sweep_interval_secs.max(1),
        );
        spawn_sweeper(self.state.limiter.clone(), sweep_every, shutdown.resubscribe());

        let config = self.state.config.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(new_config) => {
                            config.store(Arc::new(new_config));
                            tracing::info!("Configuration reloaded");
                        }
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Relay handler: parse, validate, execute.
async fn relay_handler(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    let start = Instant::now();
    let config = state.config.load_full();

    let payload = match read_payload(body, config.relay.max_request_bytes).await {
        Ok(payload) => payload,
        Err(PayloadError::TooLarge(rejection)) => {
            metrics::record_relay("too_large_request", 413, start);
            return rejection.into_response();
        }
        Err(PayloadError::Invalid(e)) => {
            metrics::record_relay(e.outcome(), e.status().as_u16(), start);
            return e.into_response();
        }
    };

    let outcome = relay_call(&state.executor, &config, &payload).await;

    match outcome {
        Ok(response) => {
            tracing::info!(
                upstream_status = response.status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Relay completed"
            );
            metrics::record_relay("ok", StatusCode::OK.as_u16(), start);
            relay_ok(response)
        }
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::warn!(request_id = %headers.request_id(), error = %e, "Relay failed");
            } else {
                tracing::info!(request_id = %headers.request_id(), error = %e, "Relay rejected");
            }
            metrics::record_relay(e.outcome(), status.as_u16(), start);
            e.into_response()
        }
    }
}

async fn relay_call(
    executor: &RelayExecutor,
    config: &ServiceConfig,
    payload: &Value,
) -> Result<RelayResponse, RelayError> {
    let request = validate(payload, config.relay.max_timeout_ms)?;
    executor.execute(&request, &config.relay).await
}

fn relay_ok(response: RelayResponse) -> Response {
    (StatusCode::OK, Json(response)).into_response()
}

enum PayloadError {
    TooLarge(AdmissionError),
    Invalid(RelayError),
}

/// Read the request body under the size cap and decode it as JSON.
async fn read_payload(body: Body, limit: usize) -> Result<Value, PayloadError> {
    let mut stream = body.into_data_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| {
            PayloadError::Invalid(
                ValidationError::new("body", "Failed to read request body").into(),
            )
        })?;
        if buf.len() + chunk.len() > limit {
            return Err(PayloadError::TooLarge(AdmissionError::TooLarge { limit }));
        }
        buf.extend_from_slice(&chunk);
    }

    serde_json::from_slice(&buf).map_err(|_| {
        PayloadError::Invalid(ValidationError::new("body", "Request body is not valid JSON").into())
    })
}

fn handle_panic(detail: Box<dyn Any + Send + 'static>) -> Response {
    let detail = detail
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| detail.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

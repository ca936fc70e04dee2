//! HTTP surface of the relay.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, panic catching)
//!     → request.rs (request ID minted or kept, echoed on the response)
//!     → POST /api/relay: rate limit → admission → relay handler
//!     → GET /health
//! ```

pub mod request;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer, RELAY_PATH};

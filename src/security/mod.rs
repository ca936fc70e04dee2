//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming relay request:
//!     → rate_limit.rs (per-caller fixed window)
//!     → admission.rs (content type, own-origin check, declared size)
//!     → relay validator (headers.rs reserved names)
//!     → relay executor (headers.rs stripped response headers)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod admission;
pub mod headers;
pub mod rate_limit;

pub use admission::{admission_middleware, AdmissionState};
pub use rate_limit::{rate_limit_middleware, RateLimitState, RateLimiter};

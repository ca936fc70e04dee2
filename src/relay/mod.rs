//! Authenticated outbound relay subsystem.
//!
//! # Data Flow
//! ```text
//! JSON payload
//!     → validator.rs (shape, enums, timeout bounds, reserved headers)
//!     → resolver.rs (allowlist, blocklisted hosts, DNS, classifier.rs)
//!     → executor.rs (fetch → redirect? → re-validate hop → fetch ...)
//!     → sanitizer.rs (drop Set-Cookie, JSON or text body)
//!     → RelayResponse
//! ```
//!
//! # Design Decisions
//! - Fail closed: unparseable addresses and DNS failures are rejections
//! - Every redirect hop passes the same checks as the initial URL
//! - Everything here is request-scoped; nothing is cached between calls

pub mod classifier;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod sanitizer;
pub mod types;
pub mod validator;

pub use classifier::{is_blocked_hostname, is_private, is_private_ip};
pub use error::{RelayError, SsrfReason, SsrfStage, ValidationError};
pub use executor::RelayExecutor;
pub use resolver::{DnsResolver, DomainAllowlist, StaticResolver, SystemResolver, TargetResolver};
pub use types::{AuthSpec, RelayBody, RelayMethod, RelayRequest, RelayResponse, ResolvedTarget};
pub use validator::validate;

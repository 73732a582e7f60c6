//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Routed request:
//!     → identifier.rs (identifier grammar, produces ValidatedIdentifiers)
//!     → rate_limit.rs (check per-IP token bucket)
//!     → Pass to upstream dispatch
//!
//! Every response:
//!     → headers.rs (strip backend identity, add hardening headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; raw path segments never reach URL construction
//! - Validation runs before rate limiting so malformed requests cost no tokens

pub mod headers;
pub mod identifier;
pub mod rate_limit;

pub use identifier::{validate_identifier, ValidatedIdentifiers};
pub use rate_limit::RateLimiter;

//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → router.rs (health check, direct-access screen, document pattern)
//!     → matcher.rs (evaluate direct-access conditions)
//!     → Return: Route::Health, Route::Document(PathMatch), or ProxyError
//!
//! Matcher Compilation (at startup):
//!     DirectAccessConfig + BackendConfig
//!     → Compile matchers (host, path prefix, markers, query names)
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Matchers compiled at startup, immutable at runtime
//! - No regex in hot path (segment splitting and substring checks only)
//! - Deterministic: same input always yields the same route
//! - Unmatched paths are a validation failure, never a silent 404

pub mod matcher;
pub mod router;

pub use router::{PathMatch, Route, Router};

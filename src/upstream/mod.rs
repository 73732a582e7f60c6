//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! ValidatedIdentifiers
//!     → target.rs (substitute into the fixed backend URL template)
//!     → pool.rs (acquire an in-flight slot, bounded wait)
//!     → dispatcher.rs (GET with allow-listed headers, deadlines, keepalive)
//!     → UpstreamResponse (status, headers, streaming body holding the slot)
//! ```
//!
//! # Design Decisions
//! - Backend scheme, host and container come from configuration only
//! - Every upstream call has a deadline; expiry maps to 504
//! - No retries: the client decides whether to retry 502/503/504
//! - The body is streamed; dropping it aborts the upstream transfer

pub mod dispatcher;
pub mod pool;
pub mod target;

pub use dispatcher::{Dispatcher, UpstreamResponse};
pub use pool::{UpstreamPermit, UpstreamPool};
pub use target::UpstreamTarget;

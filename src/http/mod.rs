//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, pipeline handler)
//!     → request.rs (request ID)
//!     → [routing decides Health / Document / reject]
//!     → [security validates and rate limits]
//!     → [upstream dispatches and streams]
//!     → response.rs (sanitize, Content-Disposition, Content-Type)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;

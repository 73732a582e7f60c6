//! Document proxy library.
//!
//! Serves `/document/{documentId}/attachment/{attachmentId}` from an object
//! storage backend whose host, container and headers stay hidden from clients.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

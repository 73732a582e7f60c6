//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::http::response::Disposition;

/// Root configuration for the document proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Storage backend the masked URLs resolve to.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Upstream connection pool bounds.
    pub pool: PoolConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Header allow/deny lists and security headers.
    pub headers: HeaderPolicyConfig,

    /// Content-Disposition policy.
    pub disposition: DispositionConfig,

    /// Markers that identify attempts to reach the backend directly.
    pub direct_access: DirectAccessConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Backend object store configuration.
///
/// Only ever read from configuration; no part of the upstream URL is taken
/// from client input except the two validated identifiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// URL scheme used to reach the backend ("https" or "http").
    pub scheme: String,

    /// Backend host, optionally with port (e.g., "account.blob.core.windows.net").
    pub host: String,

    /// Container (path prefix) holding the documents.
    pub container: String,

    /// Fixed User-Agent sent on every upstream request.
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: "storage.example.net".to_string(),
            container: "documents".to_string(),
            user_agent: concat!("document-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Timeout configuration for upstream operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Deadline for the backend to send response headers, in milliseconds.
    pub response_ms: u64,

    /// Maximum gap between two body reads, in milliseconds.
    pub read_idle_ms: u64,

    /// How long an idle keepalive connection stays pooled, in seconds.
    pub pool_idle_secs: u64,

    /// How long a request may wait for an upstream slot, in milliseconds.
    pub pool_acquire_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            response_ms: 30_000,
            read_idle_ms: 30_000,
            pool_idle_secs: 90,
            pool_acquire_ms: 250,
        }
    }
}

/// Upstream connection pool bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent in-flight upstream requests.
    pub max_in_flight: usize,

    /// Maximum idle keepalive connections kept for the backend host.
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 512,
            max_idle_per_host: 64,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Burst capacity per client IP.
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_per_second: f64,

    /// Buckets idle for longer than this are reclaimed.
    pub idle_ttl_secs: u64,

    /// Upper bound on tracked client buckets.
    pub max_buckets: usize,

    /// Interval between reclamation sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 20,
            refill_per_second: 10.0,
            idle_ttl_secs: 600,
            max_buckets: 100_000,
            sweep_interval_secs: 60,
        }
    }
}

/// Header policy in both directions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderPolicyConfig {
    /// Client request headers copied to the upstream request.
    pub forward: Vec<String>,

    /// Backend response headers removed by exact (case-insensitive) name.
    pub strip: Vec<String>,

    /// Backend response headers removed by name prefix.
    pub strip_prefixes: Vec<String>,

    /// Hardening headers added on top of nosniff and frame denial.
    pub security: HashMap<String, String>,
}

impl Default for HeaderPolicyConfig {
    fn default() -> Self {
        let forward = [
            "accept",
            "accept-encoding",
            "range",
            "if-match",
            "if-none-match",
            "if-modified-since",
            "if-unmodified-since",
            "if-range",
        ];
        let strip = ["server", "x-powered-by", "via", "x-aspnet-version"];
        let strip_prefixes = ["x-ms-", "x-amz-", "x-goog-"];

        Self {
            forward: forward.iter().map(|s| s.to_string()).collect(),
            strip: strip.iter().map(|s| s.to_string()).collect(),
            strip_prefixes: strip_prefixes.iter().map(|s| s.to_string()).collect(),
            security: HashMap::from([("referrer-policy".to_string(), "no-referrer".to_string())]),
        }
    }
}

/// Content-Disposition policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispositionConfig {
    /// Disposition for extensions missing from the table.
    pub default: Disposition,

    /// Per-extension overrides (lowercase, no dot) applied over the built-in table.
    pub overrides: HashMap<String, Disposition>,

    /// Append `filename="<attachmentId>"` to the header.
    pub include_filename: bool,
}

impl Default for DispositionConfig {
    fn default() -> Self {
        Self {
            default: Disposition::Attachment,
            overrides: HashMap::new(),
            include_filename: false,
        }
    }
}

/// Signals that a request is probing the backend instead of the masked API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectAccessConfig {
    /// Case-insensitive substrings that must never appear in a request path.
    pub path_markers: Vec<String>,

    /// Query parameter names that only make sense to the storage backend.
    pub query_params: Vec<String>,
}

impl Default for DirectAccessConfig {
    fn default() -> Self {
        let path_markers = [".blob.core.windows.net", ".s3.amazonaws.com", "storage.googleapis.com"];
        let query_params = ["sig", "sv", "se", "sp", "sr", "st", "comp", "restype", "x-amz-signature"];

        Self {
            path_markers: path_markers.iter().map(|s| s.to_string()).collect(),
            query_params: query_params.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacity > 0)
//! - Reject header names/values the HTTP layer would refuse at runtime
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationIssue>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};

use crate::config::schema::ProxyConfig;
use crate::routing::router::PUBLIC_SEGMENTS;
use crate::security::identifier::is_valid_identifier;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a deserialized configuration, collecting every issue.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        issues.push(ValidationIssue::new("listener.bind_address", "not a socket address"));
    }

    let backend = &config.backend;
    if backend.scheme != "https" && backend.scheme != "http" {
        issues.push(ValidationIssue::new("backend.scheme", "must be \"https\" or \"http\""));
    }
    if backend.host.is_empty() || backend.host.contains(['/', '?', '#', '@']) {
        issues.push(ValidationIssue::new("backend.host", "must be a bare host[:port]"));
    }
    if !is_valid_identifier(&backend.container) {
        issues.push(ValidationIssue::new("backend.container", "must match [A-Za-z0-9_.-]+"));
    }
    if PUBLIC_SEGMENTS
        .iter()
        .any(|segment| backend.container.eq_ignore_ascii_case(segment))
    {
        // The container prefix doubles as a direct-access signal.
        issues.push(ValidationIssue::new(
            "backend.container",
            format!("{:?} collides with a public route", backend.container),
        ));
    }
    if HeaderValue::from_str(&backend.user_agent).is_err() {
        issues.push(ValidationIssue::new("backend.user_agent", "not a valid header value"));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_ms", timeouts.connect_ms),
        ("timeouts.response_ms", timeouts.response_ms),
        ("timeouts.read_idle_ms", timeouts.read_idle_ms),
        ("timeouts.pool_acquire_ms", timeouts.pool_acquire_ms),
    ] {
        if value == 0 {
            issues.push(ValidationIssue::new(field, "must be greater than zero"));
        }
    }

    if config.pool.max_in_flight == 0 {
        issues.push(ValidationIssue::new("pool.max_in_flight", "must be greater than zero"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.capacity == 0 {
        issues.push(ValidationIssue::new("rate_limit.capacity", "must be greater than zero"));
    }
    if !(rate_limit.refill_per_second.is_finite() && rate_limit.refill_per_second > 0.0) {
        issues.push(ValidationIssue::new("rate_limit.refill_per_second", "must be a positive number"));
    }
    if rate_limit.max_buckets == 0 {
        issues.push(ValidationIssue::new("rate_limit.max_buckets", "must be greater than zero"));
    }
    if rate_limit.sweep_interval_secs == 0 {
        issues.push(ValidationIssue::new("rate_limit.sweep_interval_secs", "must be greater than zero"));
    }

    for name in config.headers.forward.iter().chain(&config.headers.strip) {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            issues.push(ValidationIssue::new("headers", format!("invalid header name {name:?}")));
        }
    }
    for (name, value) in &config.headers.security {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            issues.push(ValidationIssue::new(
                "headers.security",
                format!("invalid security header {name:?}"),
            ));
        }
    }

    for ext in config.disposition.overrides.keys() {
        if ext.is_empty() || ext.starts_with('.') || ext.chars().any(|c| c.is_ascii_uppercase()) {
            issues.push(ValidationIssue::new(
                "disposition.overrides",
                format!("extension {ext:?} must be lowercase without a leading dot"),
            ));
        }
    }

    let observability = &config.observability;
    if observability.log_format != "pretty" && observability.log_format != "json" {
        issues.push(ValidationIssue::new("observability.log_format", "must be \"pretty\" or \"json\""));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        issues.push(ValidationIssue::new("observability.metrics_address", "not a socket address"));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

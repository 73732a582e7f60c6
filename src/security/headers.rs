//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Build the upstream request header set from a client allow-list
//! - Strip hop-by-hop and backend-identifying response headers
//! - Provide the hardening headers added to every response
//!
//! # Design Decisions
//! - Never forward client `Host` or `X-Forwarded-*`; the backend sees only
//!   allow-listed headers plus the proxy's own `User-Agent`
//! - Deny lists are data (exact names and prefixes), not branching logic

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::config::{BackendConfig, HeaderPolicyConfig};
use crate::http::request::X_REQUEST_ID;

/// Hop-by-hop headers (RFC 9110 §7.6.1) never relayed in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Compiled header policy, built once from configuration.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    forward: Vec<HeaderName>,
    strip: Vec<String>,
    strip_prefixes: Vec<String>,
    security: Vec<(HeaderName, HeaderValue)>,
    user_agent: HeaderValue,
}

impl HeaderPolicy {
    /// Compile the policy. Entries that are not valid header names or values
    /// are skipped; config validation reports them before this point.
    pub fn new(config: &HeaderPolicyConfig, backend: &BackendConfig) -> Self {
        let forward = config
            .forward
            .iter()
            .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
            .filter(|name| !is_client_routing_header(name))
            .collect();

        let mut security = vec![
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        ];
        let mut extra: Vec<_> = config
            .security
            .iter()
            .filter_map(|(name, value)| {
                Some((
                    HeaderName::from_bytes(name.as_bytes()).ok()?,
                    HeaderValue::from_str(value).ok()?,
                ))
            })
            .collect();
        extra.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        for (name, value) in extra {
            security.retain(|(existing, _)| *existing != name);
            security.push((name, value));
        }

        let user_agent = HeaderValue::from_str(&backend.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("document-proxy"));

        Self {
            forward,
            strip: config.strip.iter().map(|s| s.to_ascii_lowercase()).collect(),
            strip_prefixes: config
                .strip_prefixes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            security,
            user_agent,
        }
    }

    /// Headers to send upstream, derived from the client's request headers.
    pub fn upstream_headers(&self, client: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in &self.forward {
            for value in client.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        if let Some(request_id) = client.get(X_REQUEST_ID) {
            headers.insert(X_REQUEST_ID, request_id.clone());
        }
        headers.insert(header::USER_AGENT, self.user_agent.clone());
        headers
    }

    /// True when a backend response header must not reach the client.
    pub fn is_stripped(&self, name: &HeaderName) -> bool {
        let name = name.as_str();
        HOP_BY_HOP.contains(&name)
            || self.strip.iter().any(|s| s == name)
            || self.strip_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Remove every denied header from a backend response header map.
    pub fn sanitize(&self, headers: &mut HeaderMap) {
        let denied: Vec<HeaderName> = headers
            .keys()
            .filter(|name| self.is_stripped(name))
            .cloned()
            .collect();
        for name in denied {
            headers.remove(&name);
        }
    }

    /// Hardening headers added to every response.
    pub fn security_headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.security
    }
}

fn is_client_routing_header(name: &HeaderName) -> bool {
    *name == header::HOST || name.as_str().starts_with("x-forwarded-") || *name == header::FORWARDED
}

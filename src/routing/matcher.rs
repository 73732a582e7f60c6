//! Direct-access detection.
//!
//! # Responsibilities
//! - Recognize requests aimed at the storage backend rather than the masked API
//! - Combine conditions with OR semantics: any hit forbids the request
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Path markers are matched case-insensitively on the raw, still-encoded path
//! - No regex to guarantee O(n) matching

use axum::body::Body;
use axum::http::Request;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;

    /// Short label used when logging a hit.
    fn reason(&self) -> &'static str;
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches a Host header naming the backend.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
    compare_port: bool,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// The host is normalized to lowercase. When it carries no port, the
    /// port of the incoming Host header is ignored.
    pub fn new(host: impl Into<String>) -> Self {
        let expected_host = host.into().to_lowercase();
        let compare_port = strip_port(&expected_host) != expected_host;
        Self {
            expected_host,
            compare_port,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        req.headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .map(|h| {
                let h = h.to_lowercase();
                if self.compare_port {
                    h == self.expected_host
                } else {
                    strip_port(&h) == self.expected_host
                }
            })
            .unwrap_or(false)
    }

    fn reason(&self) -> &'static str {
        "host header names the backend"
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        req.uri().path().starts_with(&self.prefix)
    }

    fn reason(&self) -> &'static str {
        "path addresses the backend container"
    }
}

/// Matches paths containing any of a set of markers, ignoring case.
#[derive(Debug, Clone)]
pub struct PathMarkerMatcher {
    markers: Vec<String>,
}

impl PathMarkerMatcher {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl Matcher for PathMarkerMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let path = req.uri().path().to_lowercase();
        self.markers.iter().any(|m| path.contains(m.as_str()))
    }

    fn reason(&self) -> &'static str {
        "path carries a backend marker"
    }
}

/// Matches query strings carrying any of a set of parameter names.
#[derive(Debug, Clone)]
pub struct QueryParamMatcher {
    names: Vec<String>,
}

impl QueryParamMatcher {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(|n| n.into().to_lowercase()).collect(),
        }
    }
}

impl Matcher for QueryParamMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let Some(query) = req.uri().query() else {
            return false;
        };
        query
            .split('&')
            .map(|pair| pair.split_once('=').map_or(pair, |(name, _)| name))
            .any(|name| {
                let name = name.to_lowercase();
                self.names.iter().any(|n| *n == name)
            })
    }

    fn reason(&self) -> &'static str {
        "query carries a storage parameter"
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug, Default)]
pub struct AnyMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// The reason of the first matcher that hits, if any.
    pub fn first_match(&self, req: &Request<Body>) -> Option<&'static str> {
        self.matchers
            .iter()
            .find(|m| m.matches(req))
            .map(|m| m.reason())
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().any(|m| m.matches(req))
    }

    fn reason(&self) -> &'static str {
        "direct backend access"
    }
}

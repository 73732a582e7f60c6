//! Route lookup.
//!
//! # Responsibilities
//! - Answer `/health` before anything else
//! - Screen out attempts to reach the backend directly
//! - Match `/document/{documentId}/attachment/{attachmentId}` and extract both segments
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Strict five-segment shape: no trailing slash, no extra segments
//! - Explicit validation error rather than a silent 404 for unknown paths

use axum::body::Body;
use axum::http::Request;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::routing::matcher::{
    AnyMatcher, HostMatcher, Matcher, PathMarkerMatcher, PathPrefixMatcher, QueryParamMatcher,
};

/// Path of the static health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// First path segments served by the proxy itself.
pub const PUBLIC_SEGMENTS: [&str; 2] = ["document", "health"];

/// Segments extracted from a document path. Not validated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub document_id: String,
    pub attachment_id: String,
}

/// Outcome of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    Document(PathMatch),
}

/// Structural match of the document route on a raw path.
pub fn match_document_path(path: &str) -> Option<PathMatch> {
    let mut segments = path.strip_prefix('/')?.split('/');

    let (Some("document"), Some(document_id), Some("attachment"), Some(attachment_id), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    if document_id.is_empty() || attachment_id.is_empty() {
        return None;
    }

    Some(PathMatch {
        document_id: document_id.to_string(),
        attachment_id: attachment_id.to_string(),
    })
}

/// Compiled request router.
#[derive(Debug)]
pub struct Router {
    direct_access: AnyMatcher,
}

impl Router {
    /// Compile the router from configuration.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let backend = &config.backend;
        let host = backend.host.to_lowercase();

        let mut markers = vec![
            "://".to_string(),
            "%3a%2f%2f".to_string(),
            host.clone(),
        ];
        markers.extend(config.direct_access.path_markers.iter().cloned());

        let matchers: Vec<Box<dyn Matcher>> = vec![
            Box::new(HostMatcher::new(host)),
            Box::new(PathPrefixMatcher::new(format!("/{}/", backend.container))),
            Box::new(PathMarkerMatcher::new(markers)),
            Box::new(QueryParamMatcher::new(config.direct_access.query_params.iter().cloned())),
        ];

        Self {
            direct_access: AnyMatcher::new(matchers),
        }
    }

    /// Route a request.
    pub fn route(&self, req: &Request<Body>) -> Result<Route, ProxyError> {
        let path = req.uri().path();
        if path == HEALTH_PATH {
            return Ok(Route::Health);
        }

        if let Some(reason) = self.direct_access.first_match(req) {
            return Err(ProxyError::ForbiddenDirectAccess(reason));
        }

        match_document_path(path)
            .map(Route::Document)
            .ok_or(ProxyError::Validation("path does not match /document/{id}/attachment/{id}"))
    }
}

//! Upstream request dispatch.
//!
//! # Responsibilities
//! - Build the backend GET from validated identifiers and allow-listed headers
//! - Enforce connect, response-header and read-idle deadlines
//! - Reuse keepalive connections from a shared client pool
//! - Hand back a streaming body; never buffer a document in full
//!
//! # Design Decisions
//! - Redirects are not followed; a backend redirect would reveal its location
//! - 404 becomes `NotFound`; 5xx and redirects become a `BadStatus` upstream failure
//! - Other 4xx keep their status but lose the backend body (`UpstreamStatus`)
//! - The backend is always asked with GET. A client HEAD drops the body
//!   unpolled, which costs the keepalive connection but frees the slot at once
//! - System proxies are ignored; the backend is reached directly

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use futures_util::StreamExt;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, UpstreamFailure};
use crate::security::headers::HeaderPolicy;
use crate::security::ValidatedIdentifiers;
use crate::upstream::pool::UpstreamPool;
use crate::upstream::target::UpstreamTarget;

/// A backend response ready for transformation.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Streams the backend body; holds the upstream slot until dropped.
    pub body: Body,
}

/// Forwards validated document requests to the storage backend.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    target: UpstreamTarget,
    pool: UpstreamPool,
    policy: HeaderPolicy,
    response_timeout: Duration,
}

impl Dispatcher {
    /// Build the dispatcher and its pooled HTTP client.
    pub fn new(config: &ProxyConfig, policy: HeaderPolicy) -> Result<Self, reqwest::Error> {
        let timeouts = &config.timeouts;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(timeouts.connect_ms))
            .read_timeout(Duration::from_millis(timeouts.read_idle_ms))
            .pool_idle_timeout(Duration::from_secs(timeouts.pool_idle_secs))
            .pool_max_idle_per_host(config.pool.max_idle_per_host)
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            target: UpstreamTarget::new(&config.backend),
            pool: UpstreamPool::new(
                config.pool.max_in_flight,
                Duration::from_millis(timeouts.pool_acquire_ms),
            ),
            policy,
            response_timeout: Duration::from_millis(timeouts.response_ms),
        })
    }

    /// Shared slot pool, exposed for observability.
    pub fn pool(&self) -> &UpstreamPool {
        &self.pool
    }

    /// Fetch one attachment from the backend.
    pub async fn dispatch(
        &self,
        ids: &ValidatedIdentifiers,
        client_headers: &HeaderMap,
    ) -> Result<UpstreamResponse, ProxyError> {
        let url = self.target.url_for(ids)?;
        let permit = self.pool.acquire().await?;

        let request = self
            .client
            .get(url)
            .headers(self.policy.upstream_headers(client_headers));

        let response = match tokio::time::timeout(self.response_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify(&e)),
            Err(_) => {
                return Err(ProxyError::upstream(
                    UpstreamFailure::Timeout,
                    format!("no response headers within {:?}", self.response_timeout),
                ))
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProxyError::NotFound);
        }
        if status.is_server_error() || (status.is_redirection() && status != StatusCode::NOT_MODIFIED) {
            return Err(ProxyError::upstream(
                UpstreamFailure::BadStatus,
                format!("backend answered {status}"),
            ));
        }
        if status.is_client_error() {
            return Err(ProxyError::UpstreamStatus(status));
        }

        let headers = response.headers().clone();
        let stream = response.bytes_stream().map(move |chunk| {
            let _slot = &permit;
            chunk.inspect_err(|e| tracing::warn!(error = %e, "Upstream body stream aborted"))
        });

        Ok(UpstreamResponse {
            status,
            headers,
            body: Body::from_stream(stream),
        })
    }
}

/// Map a client error to the failure taxonomy. The error text stays in logs.
fn classify(error: &reqwest::Error) -> ProxyError {
    let kind = if error.is_timeout() {
        UpstreamFailure::Timeout
    } else {
        UpstreamFailure::Unreachable
    };
    ProxyError::upstream(kind, error.to_string())
}

//! HTTP server setup and the request pipeline.
//!
//! # Responsibilities
//! - Create Axum Router with the pipeline handler
//! - Wire up middleware (tracing, request ID, security headers)
//! - Bind server to listener with graceful shutdown
//! - Run each request through route → validate → admit → dispatch → transform
//! - Run the rate-limit bucket sweeper in the background

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{request_id_of, UuidRequestId, X_REQUEST_ID};
use crate::http::response::ResponseTransformer;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::routing::{PathMatch, Route, Router as ProxyRouter};
use crate::security::headers::HeaderPolicy;
use crate::security::{RateLimiter, ValidatedIdentifiers};
use crate::upstream::Dispatcher;

/// Fixed body of the health endpoint.
pub const HEALTH_BODY: &str = "healthy";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub dispatcher: Dispatcher,
    pub transformer: Arc<ResponseTransformer>,
}

/// HTTP server for the document proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
    limiter: Option<Arc<RateLimiter>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let policy = HeaderPolicy::new(&config.headers, &config.backend);

        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::new(&config.rate_limit)));

        let state = AppState {
            router: Arc::new(ProxyRouter::from_config(&config)),
            limiter: limiter.clone(),
            dispatcher: Dispatcher::new(&config, policy.clone())?,
            transformer: Arc::new(ResponseTransformer::new(policy.clone(), &config.disposition)),
        };

        let router = Self::build_router(&policy, state);
        Ok(Self {
            router,
            config: Arc::new(config),
            limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(policy: &HeaderPolicy, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        for (name, value) in policy.security_headers() {
            router = router.layer(SetResponseHeaderLayer::overriding(name.clone(), value.clone()));
        }

        router
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id_of(request),
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// The fully layered router, for driving the pipeline without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend_host = %self.config.backend.host,
            "HTTP server starting"
        );

        if let Some(limiter) = self.limiter.clone() {
            let interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs);
            tokio::spawn(sweep_buckets(limiter, interval, shutdown.resubscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically reclaim idle rate-limit buckets until shutdown.
async fn sweep_buckets(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.sweep();
                metrics::record_tracked_clients(limiter.tracked_clients());
                if removed > 0 {
                    tracing::debug!(removed, remaining = limiter.tracked_clients(), "Reclaimed idle rate limit buckets");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Pipeline entry point for every request.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();

    let path_match = match state.router.route(&request) {
        Ok(Route::Health) => {
            metrics::record_request("health", 200, start_time);
            return health_response();
        }
        Ok(Route::Document(path_match)) => path_match,
        Err(e) => {
            tracing::warn!(client = %addr.ip(), error = %e, "Request rejected by router");
            let response = e.into_response();
            metrics::record_request("rejected", response.status().as_u16(), start_time);
            return response;
        }
    };

    // Only GET and HEAD proceed, so the request body is never read.
    let (parts, _body) = request.into_parts();

    let response = match serve_document(&state, addr.ip(), &parts.method, &parts.headers, &path_match).await {
        Ok(response) => response,
        Err(e) => {
            log_failure(&e, addr.ip());
            e.into_response()
        }
    };

    metrics::record_request("document", response.status().as_u16(), start_time);
    response
}

fn health_response() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        HEALTH_BODY,
    )
        .into_response()
}

/// Validate → admit → dispatch → transform.
async fn serve_document(
    state: &AppState,
    client_ip: IpAddr,
    method: &Method,
    headers: &HeaderMap,
    path_match: &PathMatch,
) -> Result<Response, ProxyError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ProxyError::MethodNotAllowed);
    }

    let ids = ValidatedIdentifiers::validate(path_match)?;

    if let Some(limiter) = &state.limiter {
        if !limiter.check(client_ip) {
            metrics::record_rate_limited();
            return Err(ProxyError::RateLimited);
        }
    }

    tracing::debug!(
        document_id = ids.document_id(),
        attachment_id = ids.attachment_id(),
        "Dispatching upstream"
    );

    let upstream = state.dispatcher.dispatch(&ids, headers).await?;
    let headers = state
        .transformer
        .transform(upstream.status, upstream.headers, &ids);

    let body = if method == Method::HEAD {
        // Releases the upstream slot before any body bytes are read.
        drop(upstream.body);
        Body::empty()
    } else {
        upstream.body
    };

    let mut response = Response::new(body);
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn log_failure(error: &ProxyError, client_ip: IpAddr) {
    match error {
        ProxyError::Upstream { kind, detail } => {
            metrics::record_upstream_error(kind.as_str());
            tracing::error!(kind = kind.as_str(), error = %detail, "Upstream error");
        }
        ProxyError::NotFound => tracing::debug!("Object not found upstream"),
        ProxyError::UpstreamStatus(status) => {
            tracing::warn!(status = status.as_u16(), "Backend rejected request")
        }
        ProxyError::RateLimited => tracing::warn!(client = %client_ip, "Rate limit exceeded"),
        ProxyError::Internal(_) => {}
        other => tracing::warn!(client = %client_ip, error = %other, "Request rejected"),
    }
}

//! Per-request dispatch.
//!
//! # Responsibilities
//! - Select a backend from the registry
//! - Forward method, path+query, headers and body verbatim
//! - Bound the wait for the backend's response headers
//! - Count the request as in flight while its response body streams
//!
//! # Design Decisions
//! - Fail fast: no retries and no failover to another backend
//! - The registry lock is never held across the outbound call
//! - The in-flight count is released by a guard owned by the response body,
//!   so it is returned on completion, on error and on client disconnect

use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Uri},
    response::Response,
};
use futures_util::Stream;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use uuid::Uuid;

use crate::config::TimeoutConfig;
use crate::http::response::ProxyError;
use crate::load_balancer::{Backend, ConnectionGuard, Registry};

/// Forwards requests to backends chosen by the registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    client: Client<HttpConnector, Body>,
    upstream_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            registry,
            client,
            upstream_timeout: Duration::from_secs(timeouts.upstream_secs),
        }
    }

    /// Override the deadline for a backend's response headers.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Dispatch one request from `client` to a selected backend.
    pub async fn handle(
        &self,
        client: IpAddr,
        request: Request<Body>,
    ) -> Result<Response, ProxyError> {
        let request_id = Uuid::new_v4();

        let backend = self.registry.select(client).inspect_err(|_| {
            tracing::warn!(
                request_id = %request_id,
                algorithm = %self.registry.algorithm(),
                "No backend available"
            );
        })?;

        tracing::debug!(
            request_id = %request_id,
            backend = %backend,
            method = %request.method(),
            uri = %request.uri(),
            "Dispatching request"
        );

        let outbound = build_upstream_request(&backend, request)?;

        let pending = self.client.request(outbound);
        let outcome = tokio::time::timeout(self.upstream_timeout, pending).await;
        let response: hyper::Response<Incoming> = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                tracing::warn!(
                    request_id = %request_id,
                    backend = %backend,
                    error = %source,
                    "Upstream error"
                );
                return Err(ProxyError::UpstreamUnreachable {
                    backend: backend.host().to_string(),
                    source,
                });
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    backend = %backend,
                    timeout = ?self.upstream_timeout,
                    "Upstream timed out"
                );
                return Err(ProxyError::UpstreamTimeout {
                    backend: backend.host().to_string(),
                    timeout_secs: self.upstream_timeout.as_secs_f64(),
                });
            }
        };

        let guard = self.registry.track(backend.host());

        tracing::debug!(
            request_id = %request_id,
            backend = %backend,
            status = response.status().as_u16(),
            "Upstream responded"
        );

        let (parts, body) = response.into_parts();
        let body = TrackedBody {
            inner: Body::new(body).into_data_stream(),
            _guard: guard,
        };
        Ok(Response::from_parts(parts, Body::from_stream(body)))
    }
}

/// Rewrite the request target to point at `backend`, keeping everything else.
fn build_upstream_request(
    backend: &Backend,
    request: Request<Body>,
) -> Result<Request<Body>, ProxyError> {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let invalid = |reason: String| ProxyError::InvalidUpstreamRequest {
        backend: backend.host().to_string(),
        reason,
    };

    let uri: Uri = format!("http://{}{}", backend.host(), path)
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| invalid(e.to_string()))?;

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(body)
        .map_err(|e| invalid(e.to_string()))?;
    *outbound.headers_mut() = parts.headers;
    Ok(outbound)
}

/// Response body stream that holds an in-flight connection count until it is
/// dropped.
struct TrackedBody<S> {
    inner: S,
    _guard: ConnectionGuard,
}

impl<S> Stream for TrackedBody<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

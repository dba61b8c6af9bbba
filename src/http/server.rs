//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch handler
//! - Wire up middleware (tracing, admission gate)
//! - Serve plain HTTP and, optionally, HTTPS from the same router
//! - Stop accepting on shutdown and drain in-flight requests

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::dispatch::Dispatcher;
use crate::load_balancer::Registry;
use crate::security::{rate_limit_middleware, RateLimiter};

/// HTTP front end of the load balancer.
pub struct HttpServer {
    router: Router,
    shutdown_grace: Duration,
}

impl HttpServer {
    /// Create a new HTTP server dispatching to `registry`.
    pub fn new(config: &ProxyConfig, registry: Arc<Registry>) -> Self {
        let dispatcher = Dispatcher::new(registry, &config.timeouts);
        let limiter = RateLimiter::from_config(&config.rate_limit).map(Arc::new);
        Self::with_dispatcher(
            dispatcher,
            limiter,
            Duration::from_secs(config.listener.shutdown_grace_secs),
        )
    }

    pub fn with_dispatcher(
        dispatcher: Dispatcher,
        limiter: Option<Arc<RateLimiter>>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            router: Self::build_router(dispatcher, limiter),
            shutdown_grace,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(dispatcher: Dispatcher, limiter: Option<Arc<RateLimiter>>) -> Router {
        let mut router = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(dispatcher);

        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Serve plain HTTP on `listener` until shutdown is signalled.
    pub async fn run(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until shutdown is signalled.
    pub async fn run_tls(
        &self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = Handle::new();
        let grace = self.shutdown_grace;
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            shutdown_handle.graceful_shutdown(Some(grace));
        });

        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!(address = %addr, "HTTPS server stopped");
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

/// Dispatch every request to a backend.
async fn proxy_handler(
    State(dispatcher): State<Dispatcher>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    match dispatcher.handle(addr.ip(), request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(
                client = %addr,
                error = %e,
                status = e.status().as_u16(),
                "Dispatch failed"
            );
            e.into_response()
        }
    }
}

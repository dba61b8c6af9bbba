//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the backend list (fatal on failure: nothing to serve)
//! - Start the reloader
//! - Bind listeners and begin accepting traffic
//! - Drain on shutdown, bounded by the grace period
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when backends are known)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::load_balancer::{LoadError, Registry, Reloader};
use crate::net::load_tls_config;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("initial backend load failed: {0}")]
    InitialLoad(#[from] LoadError),

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to load TLS material: {0}")]
    Tls(#[source] io::Error),

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

fn parse_addr(value: &str) -> Result<SocketAddr, StartupError> {
    value
        .parse()
        .map_err(|_| StartupError::InvalidAddress(value.to_string()))
}

/// Run the balancer until SIGINT or SIGTERM arrives.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match signals::wait_for_signal().await {
                Ok(name) => {
                    tracing::info!(signal = name, "Shutdown signal received");
                    shutdown.trigger();
                }
                Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
            }
        });
    }
    serve(config, shutdown).await
}

/// Run the balancer until `shutdown` is triggered.
pub async fn serve(config: ProxyConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let registry = Arc::new(Registry::new(config.balancer.algorithm));
    registry.load(&config.balancer.backends_file).await?;
    if registry.is_empty() {
        tracing::warn!(
            source = %config.balancer.backends_file.display(),
            "Backend list is empty; requests will be answered with 503 until a reload adds backends"
        );
    }

    let reloader = Reloader::new(
        registry.clone(),
        config.balancer.backends_file.clone(),
        Duration::from_secs(config.balancer.reload_interval_secs),
    );
    let reloader_task = tokio::spawn(reloader.run(shutdown.subscribe()));

    let http_addr = parse_addr(&config.listener.bind_address)?;
    let listener = TcpListener::bind(http_addr)
        .await
        .map_err(|source| StartupError::Bind { addr: http_addr, source })?;

    let tls = match &config.listener.tls {
        Some(tls) => {
            let addr = parse_addr(&tls.bind_address)?;
            let rustls = load_tls_config(tls).await.map_err(StartupError::Tls)?;
            Some((addr, rustls))
        }
        None => None,
    };

    let server = HttpServer::new(&config, registry.clone());
    let grace = server.shutdown_grace();

    let http = server.run(listener, shutdown.subscribe());
    let https_shutdown = shutdown.subscribe();
    let https = async {
        match tls {
            Some((addr, rustls)) => server.run_tls(addr, rustls, https_shutdown).await,
            None => Ok(()),
        }
    };

    let mut stop = shutdown.subscribe();

    tracing::info!(
        algorithm = %config.balancer.algorithm,
        backends = registry.len(),
        "Load balancer ready"
    );

    let servers = async { tokio::try_join!(http, https).map(|_| ()) };
    tokio::pin!(servers);

    let outcome = tokio::select! {
        res = &mut servers => res,
        _ = stop.recv() => match tokio::time::timeout(grace, &mut servers).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Grace period elapsed; dropping remaining connections"
                );
                Ok(())
            }
        },
    };

    // A listener that failed on its own has not stopped the reloader yet.
    shutdown.trigger();
    if let Err(e) = reloader_task.await {
        tracing::error!(error = %e, "Reloader task failed");
    }
    outcome.map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Switchyard (v0.1)
//!
//! A Layer-7 load balancer built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                    SWITCHYARD                    │
//!                         │                                                  │
//!   Client Request        │  ┌──────────┐   ┌───────────┐   ┌────────────┐  │
//!   ──────────────────────┼─▶│ listener │──▶│rate limit │──▶│ dispatcher │  │
//!                         │  │HTTP/HTTPS│   │   gate    │   └─────┬──────┘  │
//!                         │  └──────────┘   └───────────┘         │         │
//!                         │                                       ▼         │
//!                         │  ┌──────────┐   ┌─────────────────────────────┐ │
//!                         │  │ reloader │──▶│ registry (backends,         │ │
//!                         │  │(interval)│   │ counters, cursor, selector) │ │
//!                         │  └──────────┘   └─────────────────────────────┘ │
//!                         │                                       │         │
//!   Client Response       │                                       ▼         │
//!   ◀─────────────────────┼──────────── streamed body ◀──── backend call ◀──┼── Backend
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use switchyard::config::{load_config, Algorithm, ObservabilityConfig, ProxyConfig};
use switchyard::lifecycle::startup;
use switchyard::observability::logging;

#[derive(Debug, Parser)]
#[command(name = "switchyard", version, about = "Layer-7 HTTP(S) load balancer")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend list file, overriding `balancer.backends_file`.
    #[arg(short, long)]
    backends: Option<PathBuf>,

    /// Selection algorithm, overriding `balancer.algorithm`.
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// HTTP listen address, overriding `listener.bind_address`.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

impl Args {
    fn into_config(self) -> Result<ProxyConfig, switchyard::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(backends) = self.backends {
            config.balancer.backends_file = backends;
        }
        if let Some(algorithm) = self.algorithm {
            config.balancer.algorithm = algorithm;
        }
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen.to_string();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        algorithm = %config.balancer.algorithm,
        backends_file = %config.balancer.backends_file.display(),
        reload_interval_secs = config.balancer.reload_interval_secs,
        "Configuration loaded"
    );

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

//! Periodic backend list reload.
//!
//! # Responsibilities
//! - Re-read the backend source on a fixed interval
//! - Swap the result into the registry
//! - Keep the current set when a reload fails
//!
//! ```text
//!   Idle ──tick──▶ Reloading ──done/failed──▶ Idle
//!    │
//!    └──shutdown──▶ Stopped
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::load_balancer::registry::Registry;
use crate::load_balancer::source::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloaderState {
    Idle,
    Reloading,
    Stopped,
}

pub struct Reloader {
    registry: Arc<Registry>,
    source: PathBuf,
    interval: Duration,
    state: watch::Sender<ReloaderState>,
}

impl Reloader {
    pub fn new(registry: Arc<Registry>, source: impl Into<PathBuf>, interval: Duration) -> Self {
        let (state, _) = watch::channel(ReloaderState::Idle);
        Self {
            registry,
            source: source.into(),
            interval,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReloaderState> {
        self.state.subscribe()
    }

    /// Perform a single reload.
    pub async fn reload(&self) -> Result<usize, LoadError> {
        self.state.send_replace(ReloaderState::Reloading);
        let result = self.registry.load(&self.source).await;
        self.state.send_replace(ReloaderState::Idle);
        result
    }

    /// Reload on every interval tick until shutdown is signalled.
    ///
    /// The first reload happens one interval after start; the initial load is
    /// done by startup, where a failure is fatal.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            source = %self.source.display(),
            interval_secs = self.interval.as_secs_f64(),
            "Reloader starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!(source = %self.source.display(), "Reloading backend list");
                    if let Err(e) = self.reload().await {
                        tracing::error!(
                            error = %e,
                            "Failed to reload backend list. Keeping current backends."
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reloader received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        self.state.send_replace(ReloaderState::Stopped);
    }
}

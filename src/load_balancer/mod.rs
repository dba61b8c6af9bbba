//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Reloader (interval)
//!     → source.rs (read + parse backend list)
//!     → registry.rs (atomic swap of backends + counters)
//!
//! Dispatcher (per request)
//!     → registry.rs (lock, build SelectionContext)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest connections)
//!         - weighted.rs (random draw proportional to weight)
//!         - ip_hash.rs (client address → fixed backend)
//!     → registry.rs (release lock, hand back Arc<Backend>)
//! ```
//!
//! # Design Decisions
//! - Algorithms are stateless; cursor and counters live in the registry
//!   and are only touched while its lock is held
//! - A selection never sees a half-applied reload
//! - The outbound call happens after the lock is released

use std::collections::HashMap;
use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::Algorithm;

pub mod backend;
pub mod ip_hash;
pub mod least_conn;
pub mod registry;
pub mod reloader;
pub mod round_robin;
pub mod source;
pub mod weighted;

pub use backend::Backend;
pub use registry::{ConnectionGuard, Registry, Snapshot};
pub use reloader::{Reloader, ReloaderState};
pub use source::LoadError;

/// Error returned when no backend can be selected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no backend available")]
    NoBackendAvailable,
}

/// Everything an algorithm may look at for one selection.
///
/// Built by the registry while its lock is held, so the backend sequence,
/// the counters and the cursor all belong to the same snapshot.
pub struct SelectionContext<'a> {
    pub backends: &'a [Arc<Backend>],
    pub connections: &'a HashMap<String, usize>,
    pub cursor: &'a mut usize,
    pub client: IpAddr,
}

impl SelectionContext<'_> {
    /// Current in-flight count for a backend.
    pub fn connections_of(&self, backend: &Backend) -> usize {
        self.connections.get(backend.host()).copied().unwrap_or(0)
    }
}

/// A backend selection policy.
///
/// Returns the index of the chosen backend in `ctx.backends`, or `None` if the
/// sequence is empty.
pub trait LoadBalancer: Send + Sync + Debug {
    fn next_server(&self, ctx: &mut SelectionContext<'_>) -> Option<usize>;
}

/// Build the selector for an algorithm.
pub fn build(algorithm: Algorithm) -> Box<dyn LoadBalancer> {
    match algorithm {
        Algorithm::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Algorithm::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Algorithm::WeightedRoundRobin => Box::new(weighted::WeightedRoundRobin::new()),
        Algorithm::IpHash => Box::new(ip_hash::IpHash::new()),
    }
}

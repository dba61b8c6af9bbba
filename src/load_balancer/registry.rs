//! Backend registry.
//!
//! # Responsibilities
//! - Hold the current backend sequence and per-host in-flight counters
//! - Replace both atomically on reload
//! - Run the configured selector against one consistent snapshot
//! - Provide connection guards that release their count on drop
//!
//! Every read and write goes through one mutex. Critical sections are short:
//! a selection clones the chosen `Arc<Backend>` and releases the lock before
//! any network I/O happens.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Algorithm;
use crate::load_balancer::source::{read_backends, LoadError};
use crate::load_balancer::{build, Backend, LoadBalancer, SelectError, SelectionContext};

#[derive(Debug, Default)]
struct RegistryState {
    backends: Vec<Arc<Backend>>,
    connections: HashMap<String, usize>,
    cursor: usize,
    /// Bumped on every replacement.
    generation: u64,
}

/// Shared owner of the backend set.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    balancer: Box<dyn LoadBalancer>,
    algorithm: Algorithm,
}

/// Point-in-time copy of the registry contents.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub backends: Vec<Arc<Backend>>,
    pub connections: HashMap<String, usize>,
    pub generation: u64,
}

impl Registry {
    /// Create an empty registry using the given selection algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            balancer: build(algorithm),
            algorithm,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the backend source and swap it in.
    ///
    /// The file is read and parsed before the lock is taken. On failure the
    /// registry is left untouched.
    pub async fn load(&self, path: &Path) -> Result<usize, LoadError> {
        let backends = read_backends(path).await?;
        let count = backends.len();
        let generation = self.replace(backends);
        tracing::info!(
            path = %path.display(),
            backends = count,
            generation,
            "Backend list loaded"
        );
        Ok(count)
    }

    /// Replace the backend sequence and reset all counters to zero.
    ///
    /// Returns the new generation number.
    pub fn replace(&self, backends: Vec<Backend>) -> u64 {
        let backends: Vec<Arc<Backend>> = backends.into_iter().map(Arc::new).collect();
        let connections = backends
            .iter()
            .map(|b| (b.host().to_string(), 0))
            .collect();

        let mut state = self.lock();
        state.cursor = if backends.is_empty() {
            0
        } else {
            state.cursor % backends.len()
        };
        state.backends = backends;
        state.connections = connections;
        state.generation += 1;
        state.generation
    }

    /// Pick a backend for a request from `client`.
    pub fn select(&self, client: IpAddr) -> Result<Arc<Backend>, SelectError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut ctx = SelectionContext {
            backends: &state.backends,
            connections: &state.connections,
            cursor: &mut state.cursor,
            client,
        };
        let index = self
            .balancer
            .next_server(&mut ctx)
            .ok_or(SelectError::NoBackendAvailable)?;

        Ok(Arc::clone(&state.backends[index]))
    }

    /// Add one in-flight connection for `host`. Unknown hosts are ignored.
    ///
    /// Returns the generation the count was applied in.
    pub fn increment_connections(&self, host: &str) -> u64 {
        let mut state = self.lock();
        adjust(&mut state, host, Delta::Increment);
        state.generation
    }

    /// Remove one in-flight connection for `host`. Unknown hosts are ignored.
    pub fn decrement_connections(&self, host: &str) {
        adjust(&mut self.lock(), host, Delta::Decrement);
    }

    /// Count a connection against `host` for as long as the guard lives.
    pub fn track(self: &Arc<Self>, host: &str) -> ConnectionGuard {
        let generation = self.increment_connections(host);
        ConnectionGuard {
            registry: Arc::clone(self),
            host: host.to_string(),
            generation,
        }
    }

    fn release(&self, host: &str, generation: u64) {
        let mut state = self.lock();
        // Counters were reset by a reload since this connection was counted.
        if state.generation == generation {
            adjust(&mut state, host, Delta::Decrement);
        }
    }

    /// Current in-flight count for `host`, if it is in the current set.
    pub fn connections(&self, host: &str) -> Option<usize> {
        self.lock().connections.get(host).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            backends: state.backends.clone(),
            connections: state.connections.clone(),
            generation: state.generation,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Delta {
    Increment,
    Decrement,
}

fn adjust(state: &mut RegistryState, host: &str, delta: Delta) {
    if let Some(count) = state.connections.get_mut(host) {
        *count = match delta {
            Delta::Increment => *count + 1,
            Delta::Decrement => count.saturating_sub(1),
        };
    }
}

/// A RAII guard that holds one in-flight connection count.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<Registry>,
    host: String,
    generation: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.release(&self.host, self.generation);
    }
}

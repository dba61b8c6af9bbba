//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream target parsed from the backend source
//! - Carry its selection weight
//!
//! A backend is immutable once parsed. Live connection counts are kept by the
//! registry, keyed by [`Backend::host`], so a reload can discard the whole set
//! without touching in-flight requests that still hold an `Arc<Backend>`.

use std::fmt;

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    host: String,
    weight: u32,
}

impl Backend {
    /// Create a new backend. Non-positive weights are normalized to 1.
    pub fn new(host: impl Into<String>, weight: u32) -> Self {
        Self {
            host: host.into(),
            weight: weight.max(1),
        }
    }

    /// Effective network address, including the port when one was given.
    /// Also the backend's identity for connection accounting.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Selection weight, always at least 1.
    pub fn weight(&self) -> u32 {
        self.weight
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

//! Least Connections load balancing strategy.

use crate::load_balancer::{LoadBalancer, SelectionContext};

/// Least connections selector.
/// Selects the backend with the minimum number of in-flight connections.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, ctx: &mut SelectionContext<'_>) -> Option<usize> {
        // min_by_key keeps the first minimum, so ties go to the earliest entry.
        ctx.backends
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| ctx.connections_of(b))
            .map(|(idx, _)| idx)
    }
}

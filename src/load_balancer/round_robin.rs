//! Round-robin load balancing strategy.

use crate::load_balancer::{LoadBalancer, SelectionContext};

/// Round-robin selector.
/// Rotates through backends using the registry-owned cursor.
#[derive(Debug, Default)]
pub struct RoundRobin;

impl RoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, ctx: &mut SelectionContext<'_>) -> Option<usize> {
        let len = ctx.backends.len();
        if len == 0 {
            return None;
        }

        // Reduce against the current length so a shrunk set can't be overrun.
        let index = *ctx.cursor % len;
        *ctx.cursor = (index + 1) % len;
        Some(index)
    }
}

//! Weighted load balancing strategy.
//!
//! Each call is an independent random draw where a backend's chance of being
//! picked is proportional to its weight. There is no rotation pointer.

use rand::Rng;

use crate::load_balancer::{Backend, LoadBalancer, SelectionContext};

#[derive(Debug, Default)]
pub struct WeightedRoundRobin;

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn next_server(&self, ctx: &mut SelectionContext<'_>) -> Option<usize> {
        let total = total_weight(ctx.backends.iter().map(|b| b.as_ref()));
        if total == 0 {
            return None;
        }
        let draw = rand::thread_rng().gen_range(0..total);
        pick(ctx.backends.iter().map(|b| b.as_ref()), draw)
    }
}

fn total_weight<'a>(backends: impl Iterator<Item = &'a Backend>) -> u64 {
    backends.map(|b| u64::from(b.weight())).sum()
}

/// Walk the sequence accumulating weight and return the first index whose
/// cumulative weight exceeds `draw`.
fn pick<'a>(backends: impl Iterator<Item = &'a Backend>, draw: u64) -> Option<usize> {
    let mut cumulative = 0u64;
    for (idx, backend) in backends.enumerate() {
        cumulative += u64::from(backend.weight());
        if draw < cumulative {
            return Some(idx);
        }
    }
    None
}

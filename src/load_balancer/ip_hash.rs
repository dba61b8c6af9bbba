//! Client IP hashing strategy.
//!
//! The same client address maps to the same backend for as long as the
//! backend set is unchanged. A reload that changes the set size reshuffles
//! the mapping.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use crate::load_balancer::{LoadBalancer, SelectionContext};

#[derive(Debug, Default)]
pub struct IpHash;

impl IpHash {
    pub fn new() -> Self {
        Self
    }
}

fn hash_ip(ip: &IpAddr) -> u64 {
    let mut hasher = DefaultHasher::new();
    ip.hash(&mut hasher);
    hasher.finish()
}

impl LoadBalancer for IpHash {
    fn next_server(&self, ctx: &mut SelectionContext<'_>) -> Option<usize> {
        let len = ctx.backends.len();
        if len == 0 {
            return None;
        }
        Some((hash_ip(&ctx.client) % len as u64) as usize)
    }
}

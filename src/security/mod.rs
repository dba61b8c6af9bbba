//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (global requests-per-second budget)
//!     → Pass to dispatcher, or 429
//! ```

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiter};

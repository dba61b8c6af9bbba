//! Request admission gate.
//!
//! One token bucket for the whole process: requests beyond the configured
//! requests-per-second budget (plus burst) are answered with 429 before they
//! reach the dispatcher.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Process-wide admission gate.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    rps: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let burst = f64::from(burst_size.max(1));
        Self {
            bucket: Mutex::new(TokenBucket::new(burst, Instant::now())),
            rps: f64::from(requests_per_second),
            burst,
        }
    }

    /// Build a limiter if rate limiting is enabled.
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.requests_per_second, config.burst_size))
    }

    /// Decide whether one request may proceed.
    pub fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now())
    }

    fn try_admit_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_acquire(self.burst, self.rps, now)
    }
}

/// Middleware rejecting requests over budget with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if limiter.try_admit() {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded\n").into_response()
    }
}

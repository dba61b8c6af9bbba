//! Network layer subsystem.
//!
//! Listeners are bound by `lifecycle::startup`; this module only provides
//! the TLS material for the HTTPS listener. There is no accept-side
//! connection limit: every request gets its own task.

pub mod tls;

pub use tls::load_tls_config;

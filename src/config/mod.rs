//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to startup, which wires the subsystems
//! ```
//!
//! The backend list is not part of this file. It lives in its own
//! line-oriented source (see `load_balancer::source`) and is reloaded on an
//! interval without touching the rest of the configuration.
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    Algorithm, BalancerConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig,
    RateLimitConfig, TimeoutConfig, TlsConfig,
};

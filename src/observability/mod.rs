//! Observability subsystem.
//!
//! All subsystems emit structured `tracing` events; `logging.rs` installs the
//! subscriber that formats them.

pub mod logging;

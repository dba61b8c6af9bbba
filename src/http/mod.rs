//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware)
//!     → security::rate_limit (admit or 429)
//!     → dispatch.rs (select backend, forward, account)
//!     → response.rs (error → status; backend responses pass through)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod response;
pub mod server;

pub use dispatch::Dispatcher;
pub use response::ProxyError;
pub use server::HttpServer;

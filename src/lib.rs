//! Switchyard: a Layer-7 HTTP(S) load balancer.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::{Dispatcher, HttpServer};
pub use lifecycle::Shutdown;
pub use load_balancer::{Registry, Reloader};

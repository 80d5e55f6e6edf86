//! mDNS discovery gateway and CORS-injecting HTTP relay.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use engine::Engine;
pub use error::ProxyError;
pub use lifecycle::Shutdown;

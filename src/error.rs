//! Process-level errors. Per-connection failures live in `engine` and never reach here.

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::discovery::DiscoveryError;
use crate::net::listener::ListenerError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

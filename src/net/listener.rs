//! TCP listener with an explicit handle bound.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections through an [`Acceptor`]
//! - Decide whether a new connection fits under `max_connections`
//! - Pace accepting after accept errors ([`AcceptBackoff`])
//!
//! # Design Decisions
//! - Over-limit connections are accepted and closed straight away rather
//!   than left in the kernel backlog, so clients see a prompt reset
//! - Accept errors are per-connection and never stop the loop
//! - A failing accept (EMFILE, ENFILE) stays ready on every poll; the engine
//!   parks the accept branch for a growing delay instead of spinning on it

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;

/// First pause after an accept error.
pub const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
/// Longest pause between accept attempts while errors persist.
pub const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(std::io::Error),
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),
}

/// Source of inbound connections.
pub trait Acceptor: Send + Sync {
    fn accept(
        &self,
    ) -> impl Future<Output = std::io::Result<(TcpStream, SocketAddr)>> + Send + '_;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

impl Acceptor for TcpListener {
    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// A TCP listener that knows how many handles the engine may hold.
#[derive(Debug)]
pub struct Listener<A = TcpListener> {
    inner: A,
    max_connections: usize,
}

impl Listener<TcpListener> {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Self::from_listener(listener, config.max_connections)
    }
}

impl<A: Acceptor> Listener<A> {
    /// Wrap an already bound acceptor.
    pub fn from_listener(listener: A, max_connections: usize) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            max_connections,
        })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        self.inner.accept().await.map_err(ListenerError::Accept)
    }

    /// Whether one more handle may be opened while `open` are already held.
    pub fn has_capacity(&self, open: usize) -> bool {
        open < self.max_connections
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Exponential pause between accept attempts after consecutive failures.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    failures: u32,
    base: Duration,
    max: Duration,
}

impl AcceptBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            failures: 0,
            base,
            max,
        }
    }

    /// Record a failed accept and return how long to pause before the next one.
    pub fn on_error(&mut self) -> Duration {
        let shift = self.failures.min(16);
        self.failures = self.failures.saturating_add(1);
        self.base.saturating_mul(1 << shift).min(self.max)
    }

    /// A connection was accepted; the next error starts from `base` again.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new(ACCEPT_BACKOFF_BASE, ACCEPT_BACKOFF_MAX)
    }
}

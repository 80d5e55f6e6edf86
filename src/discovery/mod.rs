//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! refresh timer fires (engine)
//!     → DiscoverySource::issue_query (fire and forget)
//! ... later ...
//! DiscoverySource::next_update resolves (engine readiness set)
//!     → DiscoveryUpdate::Resolved → cache.put(name, payload)
//!     → DiscoveryUpdate::Removed  → cache.remove(name)
//! GET /mdns
//!     → cache.snapshot() → JSON object
//! ```
//!
//! # Design Decisions
//! - The engine only sees the `DiscoverySource` trait; mDNS wire handling
//!   stays inside `mdns-sd`
//! - Payloads are pre-serialized JSON so a snapshot is pure string assembly

pub mod cache;
pub mod mdns;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

pub use cache::DiscoveryCache;
pub use mdns::MdnsBrowser;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS daemon error: {0}")]
    Mdns(#[from] mdns_sd::Error),
}

/// A change reported by the discovery collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryUpdate {
    /// A service was (re)announced; `payload` is a JSON value.
    Resolved { name: String, payload: String },
    /// A service said goodbye.
    Removed { name: String },
}

/// The external discovery collaborator as seen by the event loop.
pub trait DiscoverySource {
    /// Send a discovery query. Answers arrive later through `next_update`.
    fn issue_query(&mut self) -> Result<(), DiscoveryError>;

    /// Wait for the next update. Must be cancel-safe: the engine drops this
    /// future whenever another handle becomes ready first.
    fn next_update(&mut self) -> impl Future<Output = DiscoveryUpdate> + Send + '_;

    /// Release collaborator resources at shutdown.
    fn shutdown(&mut self) {}
}

/// Source used when discovery is disabled: queries are no-ops and no
/// update ever arrives.
#[derive(Debug, Default)]
pub struct NoDiscovery;

impl DiscoverySource for NoDiscovery {
    fn issue_query(&mut self) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn next_update(&mut self) -> DiscoveryUpdate {
        std::future::pending().await
    }
}

/// Source fed by an in-process channel, for push-style collaborators.
#[derive(Debug)]
pub struct ChannelSource {
    updates: mpsc::UnboundedReceiver<DiscoveryUpdate>,
    queries: Arc<AtomicUsize>,
}

impl ChannelSource {
    /// Returns the source, the sender that feeds it, and a counter of
    /// queries the engine has issued.
    pub fn new() -> (Self, mpsc::UnboundedSender<DiscoveryUpdate>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queries = Arc::new(AtomicUsize::new(0));
        (
            Self {
                updates: rx,
                queries: Arc::clone(&queries),
            },
            tx,
            queries,
        )
    }
}

impl DiscoverySource for ChannelSource {
    fn issue_query(&mut self) -> Result<(), DiscoveryError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn next_update(&mut self) -> DiscoveryUpdate {
        match self.updates.recv().await {
            Some(update) => update,
            // All senders gone: behave like a silent network.
            None => std::future::pending().await,
        }
    }
}

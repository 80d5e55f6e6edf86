//! Event loop subsystem.
//!
//! # Data Flow
//! ```text
//! tokio::select! (biased, one task, in this order)
//!     shutdown signal   → leave loop, close every handle
//!     refresh timer     → discovery query
//!     discovery source  → cache put / remove
//!     readiness set     → read chunk → dispatch.rs
//!                             unstarted initiator → classify → serve / connect + pair
//!                             paired initiator    → relay to responder
//!                             responder           → CORS rewrite → relay to initiator
//!     listening socket  → accept → registry (initiator, unpaired)
//!                         accept error → park accepting for a backoff pause
//! ```
//!
//! # Design Decisions
//! - Every read half sits in a `FuturesUnordered` as an abortable future;
//!   closing a handle aborts its pending read so the socket is released
//!   in the same iteration
//! - Writes are awaited inline; a slow peer stalls the loop
//! - Any per-connection failure closes that handle and its peer, never the loop
//! - Accepting comes last: open pairs keep moving, and release descriptors,
//!   even while the listener is failing

mod dispatch;
mod event_loop;

use thiserror::Error;

use crate::http::ProtocolError;
use crate::net::registry::{Handle, RegistryError};
use crate::net::relay::RelayError;

pub use event_loop::Engine;

/// Failure scoped to one connection (and its peer).
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("connect to {destination} failed: {source}")]
    Connect {
        destination: String,
        source: std::io::Error,
    },

    #[error("connect to {destination} timed out")]
    ConnectTimeout { destination: String },

    #[error("handle limit of {0} reached")]
    Capacity(usize),

    #[error("{0} has no open peer")]
    NoPeer(Handle),
}

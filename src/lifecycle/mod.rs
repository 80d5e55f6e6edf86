//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → engine loop exits → every open handle closed
//!             → discovery daemon shut down
//! ```
//!
//! # Design Decisions
//! - The engine never installs signal handlers itself; it only watches a
//!   `ShutdownSignal`, so tests can stop it directly
//! - No per-connection drain: closing is immediate

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};

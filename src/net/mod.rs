//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, handle bound)
//!     → registry.rs (handle allocated, role = initiator, peer = none)
//!     → Hand off to the http protocol layer for classification
//!
//! Paired traffic
//!     → relay.rs (flush each chunk to the peer handle)
//! ```
//!
//! # Design Decisions
//! - Handles are registry-allocated IDs, not OS descriptors
//! - The registry is pure state; all socket I/O lives in the engine and relay
//! - Releasing one half of a pair always reports its peer

pub mod listener;
pub mod registry;
pub mod relay;

pub use listener::{AcceptBackoff, Acceptor, Listener};
pub use registry::{ConnectionRecord, Handle, Registry, Role};

//! Connection registry: per-handle pairing state.
//!
//! # Responsibilities
//! - Allocate opaque handle identifiers
//! - Track the role of every open handle (initiator / responder)
//! - Keep the peer relation symmetric
//!
//! Pure state, no I/O. The event loop owns the only instance.

use std::collections::BTreeMap;

use thiserror::Error;

/// Opaque identifier for an open network connection.
///
/// Allocated monotonically by the registry and never reused within a process,
/// so a stale handle can never alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side of a pairing a handle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted from a client; carries the original request.
    Initiator,
    /// Opened towards the forwarding target; its data gets CORS-rewritten.
    Responder,
}

/// State kept for every open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub peer: Option<Handle>,
    pub role: Role,
}

impl ConnectionRecord {
    /// An initiator that has not yet been paired still needs its request classified.
    pub fn is_unstarted(&self) -> bool {
        self.role == Role::Initiator && self.peer.is_none()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is not registered")]
    Unknown(Handle),
    #[error("{0} is already paired")]
    AlreadyPaired(Handle),
    #[error("cannot pair {0} with itself")]
    SelfPair(Handle),
}

/// Mapping from handle to connection record.
///
/// Ordered by handle so iteration (and teardown at shutdown) is deterministic.
#[derive(Debug, Default)]
pub struct Registry {
    records: BTreeMap<Handle, ConnectionRecord>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh handle. The handle is not registered until `register`.
    pub fn allocate(&mut self) -> Handle {
        self.next_id += 1;
        Handle(self.next_id)
    }

    /// Register an unpaired handle with the given role.
    pub fn register(&mut self, handle: Handle, role: Role) {
        self.records.insert(handle, ConnectionRecord { peer: None, role });
    }

    /// Pair two registered, unpaired handles. Both records are updated together.
    pub fn pair(&mut self, a: Handle, b: Handle) -> Result<(), RegistryError> {
        if a == b {
            return Err(RegistryError::SelfPair(a));
        }
        for handle in [a, b] {
            match self.records.get(&handle) {
                None => return Err(RegistryError::Unknown(handle)),
                Some(record) if record.peer.is_some() => {
                    return Err(RegistryError::AlreadyPaired(handle))
                }
                Some(_) => {}
            }
        }

        // Both present and unpaired, checked above.
        if let Some(record) = self.records.get_mut(&a) {
            record.peer = Some(b);
        }
        if let Some(record) = self.records.get_mut(&b) {
            record.peer = Some(a);
        }
        Ok(())
    }

    pub fn lookup(&self, handle: Handle) -> Option<&ConnectionRecord> {
        self.records.get(&handle)
    }

    /// Remove a handle and return its record so the caller can release the peer too.
    ///
    /// The peer's back-reference is cleared so no record is left pointing at a
    /// removed handle, even if the caller keeps the peer around.
    pub fn release(&mut self, handle: Handle) -> Option<ConnectionRecord> {
        let record = self.records.remove(&handle)?;
        if let Some(peer) = record.peer {
            if let Some(peer_record) = self.records.get_mut(&peer) {
                if peer_record.peer == Some(handle) {
                    peer_record.peer = None;
                }
            }
        }
        Some(record)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.records.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All registered handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        self.records.keys().copied().collect()
    }
}

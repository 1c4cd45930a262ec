//! Connection registry
//!
//! The registry is the single source of truth for which peers this node is
//! connected to, in which direction, and which write handles the broadcaster
//! fans out to. The discovery loop, the inbound acceptor, the command layer
//! and the read pumps all mutate it concurrently.
//!
//! # Locking discipline
//!
//! All collections live behind one `std::sync::Mutex`. The lock is only held
//! for short in-memory operations and never across an `.await`; snapshots
//! are copied out under the lock so callers never iterate shared storage.
//!
//! # Outbound deduplication
//!
//! Opening a stream takes time, so "check then add" is split into an atomic
//! reservation step: [`ConnectionRegistry::claim_outbound`] fails if the peer
//! is already connected outbound or another task is dialing it, and returns
//! an [`OutboundClaim`]. The claim is consumed by
//! [`ConnectionRegistry::add_outbound`] once the stream is open; dropping it
//! instead (dial failed) releases the reservation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rvz_core::error::RegistryError;
use rvz_core::{ConnectionId, Direction, PeerId};

use super::writer::LineWriter;

struct OutboundEntry {
    peer: PeerId,
    id: ConnectionId,
    writer: Arc<LineWriter>,
}

struct InboundEntry {
    peer: PeerId,
    id: ConnectionId,
}

#[derive(Default)]
struct RegistryInner {
    outbound: Vec<OutboundEntry>,
    inbound: Vec<InboundEntry>,
    dialing: HashSet<PeerId>,
}

impl RegistryInner {
    fn has_outbound(&self, peer: &PeerId) -> bool {
        self.outbound.iter().any(|e| &e.peer == peer)
    }

    fn check_outbound(&self, peer: &PeerId) -> Result<(), RegistryError> {
        if self.has_outbound(peer) {
            return Err(RegistryError::AlreadyConnected(peer.clone()));
        }
        if self.dialing.contains(peer) {
            return Err(RegistryError::DialInProgress(peer.clone()));
        }
        Ok(())
    }
}

/// Point-in-time copy of the registered peers, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Peers this node writes to
    pub outbound: Vec<PeerId>,
    /// Peers that opened a stream to this node (repeats possible)
    pub inbound: Vec<PeerId>,
}

/// Number of registered connections per direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionCounts {
    pub inbound: usize,
    pub outbound: usize,
}

/// A write handle eligible for broadcast
#[derive(Debug, Clone)]
pub struct BroadcastHandle {
    pub peer: PeerId,
    pub id: ConnectionId,
    pub writer: Arc<LineWriter>,
}

/// Process-wide registry of live connections
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Every critical section leaves the collections consistent, so a
        // panic elsewhere does not invalidate the data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether an outbound connection to `peer` is registered
    pub fn is_outbound_connected(&self, peer: &PeerId) -> bool {
        self.lock().has_outbound(peer)
    }

    /// Whether at least one inbound connection from `peer` is registered
    pub fn is_inbound_connected(&self, peer: &PeerId) -> bool {
        self.lock().inbound.iter().any(|e| &e.peer == peer)
    }

    /// Atomically reserve the right to open an outbound stream to `peer`
    pub fn claim_outbound(self: &Arc<Self>, peer: &PeerId) -> Result<OutboundClaim, RegistryError> {
        let mut inner = self.lock();
        inner.check_outbound(peer)?;
        inner.dialing.insert(peer.clone());

        Ok(OutboundClaim {
            registry: Arc::clone(self),
            peer: peer.clone(),
            settled: false,
        })
    }

    /// Register the outbound connection a claim was taken for
    pub fn add_outbound(&self, mut claim: OutboundClaim, writer: Arc<LineWriter>) -> ConnectionId {
        debug_assert!(
            std::ptr::eq(Arc::as_ptr(&claim.registry), self),
            "claim belongs to a different registry"
        );

        let id = self.allocate_id();
        {
            let mut inner = self.lock();
            inner.dialing.remove(&claim.peer);
            inner.outbound.push(OutboundEntry {
                peer: claim.peer.clone(),
                id,
                writer,
            });
        }
        claim.settled = true;

        tracing::debug!(peer = %claim.peer, connection = %id, "outbound connection registered");
        id
    }

    /// Check-and-add for a stream that is already open
    ///
    /// Fails without registering anything if the peer is already connected
    /// outbound or being dialed.
    pub fn try_add_outbound(
        &self,
        peer: &PeerId,
        writer: Arc<LineWriter>,
    ) -> Result<ConnectionId, RegistryError> {
        let id = {
            let mut inner = self.lock();
            inner.check_outbound(peer)?;
            let id = self.allocate_id();
            inner.outbound.push(OutboundEntry {
                peer: peer.clone(),
                id,
                writer,
            });
            id
        };

        tracing::debug!(peer = %peer, connection = %id, "outbound connection registered");
        Ok(id)
    }

    /// Register an inbound connection
    ///
    /// Repeated inbound connections from the same peer are kept as separate
    /// entries, each with its own ID.
    pub fn add_inbound(&self, peer: &PeerId) -> ConnectionId {
        let id = self.allocate_id();
        self.lock().inbound.push(InboundEntry {
            peer: peer.clone(),
            id,
        });

        tracing::debug!(peer = %peer, connection = %id, "inbound connection registered");
        id
    }

    /// Remove one connection. Returns false if it was not registered.
    pub fn remove(&self, peer: &PeerId, direction: Direction, id: ConnectionId) -> bool {
        let mut inner = self.lock();
        let removed = match direction {
            Direction::Outbound => {
                let before = inner.outbound.len();
                inner.outbound.retain(|e| !(e.id == id && &e.peer == peer));
                before != inner.outbound.len()
            }
            Direction::Inbound => {
                let before = inner.inbound.len();
                inner.inbound.retain(|e| !(e.id == id && &e.peer == peer));
                before != inner.inbound.len()
            }
        };
        drop(inner);

        if removed {
            tracing::debug!(peer = %peer, %direction, connection = %id, "connection removed");
        }
        removed
    }

    /// Copy of the registered peer IDs
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.lock();
        RegistrySnapshot {
            outbound: inner.outbound.iter().map(|e| e.peer.clone()).collect(),
            inbound: inner.inbound.iter().map(|e| e.peer.clone()).collect(),
        }
    }

    /// All write handles eligible for fan-out, one per outbound connection
    pub fn broadcast_handles(&self) -> Vec<BroadcastHandle> {
        self.lock()
            .outbound
            .iter()
            .map(|e| BroadcastHandle {
                peer: e.peer.clone(),
                id: e.id,
                writer: Arc::clone(&e.writer),
            })
            .collect()
    }

    /// Number of registered connections per direction
    pub fn counts(&self) -> ConnectionCounts {
        let inner = self.lock();
        ConnectionCounts {
            inbound: inner.inbound.len(),
            outbound: inner.outbound.len(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reservation for one outbound dial, see [`ConnectionRegistry::claim_outbound`]
pub struct OutboundClaim {
    registry: Arc<ConnectionRegistry>,
    peer: PeerId,
    settled: bool,
}

impl OutboundClaim {
    /// Peer this claim reserves
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }
}

impl Drop for OutboundClaim {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.lock().dialing.remove(&self.peer);
            tracing::trace!(peer = %self.peer, "outbound claim released");
        }
    }
}

impl std::fmt::Debug for OutboundClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundClaim")
            .field("peer", &self.peer)
            .field("settled", &self.settled)
            .finish()
    }
}

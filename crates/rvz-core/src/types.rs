//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Stable identity of a peer, independent of its network addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a new peer ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identity for this process
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A provider record returned by a directory lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Identity of the announcing peer
    pub id: PeerId,
    /// Addresses the peer can be dialed on
    pub addresses: Vec<SocketAddr>,
}

impl PeerDescriptor {
    /// Create a new descriptor
    pub fn new(id: impl Into<PeerId>, addresses: Vec<SocketAddr>) -> Self {
        Self {
            id: id.into(),
            addresses,
        }
    }

    /// A descriptor without addresses cannot be dialed
    pub fn is_dialable(&self) -> bool {
        !self.addresses.is_empty()
    }
}

/// Which side opened a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The remote peer opened the stream
    Inbound,
    /// This host opened the stream
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Process-local identifier of one registered connection
///
/// Distinguishes repeated inbound connections from the same peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_peer_ids_differ() {
        let a = PeerId::random();
        let b = PeerId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_descriptor_without_addresses_is_not_dialable() {
        let empty = PeerDescriptor::new("peer-a", vec![]);
        assert!(!empty.is_dialable());

        let dialable = PeerDescriptor::new("peer-a", vec!["10.0.0.1:4001".parse().unwrap()]);
        assert!(dialable.is_dialable());
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(format!("{}", Direction::Inbound), "inbound");
        assert_eq!(format!("{}", Direction::Outbound), "outbound");
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }
}

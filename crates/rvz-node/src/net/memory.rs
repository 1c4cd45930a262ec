//! In-process network: provider directory and hosts over `tokio::io::duplex`
//!
//! Every host and directory created from one [`MemoryNetwork`] shares the
//! same provider records and stream handlers. Failure injection hooks make
//! unreachable peers, stalled dials and directory outages reproducible.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use rvz_core::error::{DirectoryError, TransportError};
use rvz_core::traits::{BoxedStream, Host, InboundStream, ProviderDirectory};
use rvz_core::{DiscoveryKey, PeerDescriptor, PeerId};

/// Buffer size of each in-memory stream
const STREAM_BUFFER: usize = 64 * 1024;

/// Capacity of each inbound stream channel
const INBOUND_QUEUE: usize = 64;

#[derive(Default)]
struct NetworkInner {
    providers: DashMap<DiscoveryKey, Vec<PeerDescriptor>>,
    handlers: DashMap<(PeerId, String), mpsc::Sender<InboundStream>>,
    addresses: DashMap<PeerId, Vec<SocketAddr>>,
    unreachable: DashSet<PeerId>,
    stalled: DashSet<PeerId>,
    dial_attempts: DashMap<PeerId, usize>,
    lookup_failures: AtomicUsize,
    announce_failures: AtomicUsize,
    lookups_stalled: AtomicBool,
    next_host: AtomicU32,
}

/// Consume one injected failure, if any are left
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// A simulated network shared by any number of hosts
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a host with a fresh synthetic address
    pub fn host(&self, id: PeerId) -> Arc<MemoryHost> {
        let n = self.inner.next_host.fetch_add(1, Ordering::Relaxed) + 1;
        let addr = SocketAddr::from(([10, 0, (n >> 8) as u8, n as u8], 4001));
        self.inner.addresses.insert(id.clone(), vec![addr]);

        Arc::new(MemoryHost {
            network: Arc::clone(&self.inner),
            id,
            peers: DashMap::new(),
        })
    }

    /// Directory client announcing on behalf of `id`
    pub fn directory(&self, id: PeerId) -> Arc<MemoryDirectory> {
        Arc::new(MemoryDirectory {
            network: Arc::clone(&self.inner),
            id,
        })
    }

    /// Add a provider record directly, bypassing announce
    pub fn inject_provider(&self, key: &DiscoveryKey, descriptor: PeerDescriptor) {
        upsert(&mut self.inner.providers.entry(*key).or_default(), descriptor);
    }

    /// Current provider records for `key`
    pub fn providers(&self, key: &DiscoveryKey) -> Vec<PeerDescriptor> {
        self.inner
            .providers
            .get(key)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Make stream opens to `peer` fail as unreachable
    pub fn set_unreachable(&self, peer: &PeerId, unreachable: bool) {
        if unreachable {
            self.inner.unreachable.insert(peer.clone());
        } else {
            self.inner.unreachable.remove(peer);
        }
    }

    /// Make stream opens to `peer` hang forever
    pub fn set_stalled(&self, peer: &PeerId, stalled: bool) {
        if stalled {
            self.inner.stalled.insert(peer.clone());
        } else {
            self.inner.stalled.remove(peer);
        }
    }

    /// Make lookups hang forever
    pub fn stall_lookups(&self, stalled: bool) {
        self.inner.lookups_stalled.store(stalled, Ordering::SeqCst);
    }

    /// Fail the next `count` lookups
    pub fn fail_lookups(&self, count: usize) {
        self.inner.lookup_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` announces
    pub fn fail_announces(&self, count: usize) {
        self.inner.announce_failures.store(count, Ordering::SeqCst);
    }

    /// Number of stream opens attempted towards `peer`
    pub fn dial_attempts(&self, peer: &PeerId) -> usize {
        self.inner.dial_attempts.get(peer).map(|n| *n).unwrap_or(0)
    }
}

fn upsert(records: &mut Vec<PeerDescriptor>, descriptor: PeerDescriptor) {
    match records.iter_mut().find(|r| r.id == descriptor.id) {
        Some(existing) => *existing = descriptor,
        None => records.push(descriptor),
    }
}

/// Host attached to a [`MemoryNetwork`]
pub struct MemoryHost {
    network: Arc<NetworkInner>,
    id: PeerId,
    peers: DashMap<PeerId, Vec<SocketAddr>>,
}

#[async_trait]
impl Host for MemoryHost {
    fn local_identity(&self) -> &PeerId {
        &self.id
    }

    fn local_addresses(&self) -> Vec<SocketAddr> {
        self.network
            .addresses
            .get(&self.id)
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn known_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.iter().map(|e| e.key().clone()).collect();
        peers.sort();
        peers
    }

    fn known_addresses(&self, peer: &PeerId) -> Vec<SocketAddr> {
        self.peers.get(peer).map(|a| a.clone()).unwrap_or_default()
    }

    fn remember(&self, peer: &PeerDescriptor) {
        if peer.id != self.id {
            self.peers.insert(peer.id.clone(), peer.addresses.clone());
        }
    }

    async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &str,
    ) -> Result<BoxedStream, TransportError> {
        *self.network.dial_attempts.entry(peer.clone()).or_insert(0) += 1;

        if self.known_addresses(peer).is_empty() {
            return Err(TransportError::NoAddresses(peer.clone()));
        }
        if self.network.stalled.contains(peer) {
            std::future::pending::<()>().await;
        }
        if self.network.unreachable.contains(peer) {
            return Err(TransportError::Unreachable {
                peer: peer.clone(),
                reason: "no route to peer".to_string(),
            });
        }

        let handler = self
            .network
            .handlers
            .get(&(peer.clone(), protocol.to_string()))
            .map(|tx| tx.clone())
            .ok_or_else(|| TransportError::ProtocolRejected {
                peer: peer.clone(),
                protocol: protocol.to_string(),
            })?;

        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        let inbound = InboundStream {
            peer: self.id.clone(),
            stream: Box::new(remote),
        };
        handler
            .send(inbound)
            .await
            .map_err(|_| TransportError::Unreachable {
                peer: peer.clone(),
                reason: "peer stopped accepting streams".to_string(),
            })?;

        Ok(Box::new(local))
    }

    fn incoming(&self, protocol: &str) -> Result<mpsc::Receiver<InboundStream>, TransportError> {
        match self
            .network
            .handlers
            .entry((self.id.clone(), protocol.to_string()))
        {
            Entry::Occupied(_) => Err(TransportError::HandlerExists(protocol.to_string())),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
                slot.insert(tx);
                Ok(rx)
            }
        }
    }
}

/// Provider directory view of a [`MemoryNetwork`]
pub struct MemoryDirectory {
    network: Arc<NetworkInner>,
    id: PeerId,
}

#[async_trait]
impl ProviderDirectory for MemoryDirectory {
    async fn announce(&self, key: &DiscoveryKey) -> Result<(), DirectoryError> {
        if take_failure(&self.network.announce_failures) {
            return Err(DirectoryError::Unavailable("injected announce failure".to_string()));
        }

        let addresses = self
            .network
            .addresses
            .get(&self.id)
            .map(|a| a.clone())
            .unwrap_or_default();
        upsert(
            &mut self.network.providers.entry(*key).or_default(),
            PeerDescriptor::new(self.id.clone(), addresses),
        );
        Ok(())
    }

    async fn lookup(&self, key: &DiscoveryKey) -> Result<Vec<PeerDescriptor>, DirectoryError> {
        if self.network.lookups_stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if take_failure(&self.network.lookup_failures) {
            return Err(DirectoryError::Unavailable("injected lookup failure".to_string()));
        }

        Ok(self
            .network
            .providers
            .get(key)
            .map(|records| records.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvz_protocol::CHAT_PROTOCOL;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_announce_is_idempotent() {
        let network = MemoryNetwork::new();
        let key = DiscoveryKey::derive("room");
        let directory = network.directory(PeerId::new("peerA"));
        network.host(PeerId::new("peerA"));

        directory.announce(&key).await.unwrap();
        directory.announce(&key).await.unwrap();

        let providers = directory.lookup(&key).await.unwrap();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].is_dialable());
    }

    #[tokio::test]
    async fn test_open_stream_delivers_inbound() {
        let network = MemoryNetwork::new();
        let a = network.host(PeerId::new("peerA"));
        let b = network.host(PeerId::new("peerB"));
        let mut incoming = b.incoming(CHAT_PROTOCOL).unwrap();

        a.remember(&PeerDescriptor::new("peerB", b.local_addresses()));
        let mut out = a.open_stream(&PeerId::new("peerB"), CHAT_PROTOCOL).await.unwrap();
        let mut inbound = incoming.recv().await.unwrap();
        assert_eq!(inbound.peer, PeerId::new("peerA"));

        out.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        inbound.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_open_stream_failures() {
        let network = MemoryNetwork::new();
        let a = network.host(PeerId::new("peerA"));
        let b = network.host(PeerId::new("peerB"));
        let peer_b = PeerId::new("peerB");

        let err = a
            .open_stream(&peer_b, CHAT_PROTOCOL)
            .await
            .err()
            .expect("peer has no addresses");
        assert!(matches!(err, TransportError::NoAddresses(_)));

        a.remember(&PeerDescriptor::new("peerB", b.local_addresses()));
        let err = a
            .open_stream(&peer_b, CHAT_PROTOCOL)
            .await
            .err()
            .expect("peer has no chat handler");
        assert!(matches!(err, TransportError::ProtocolRejected { .. }));

        let _incoming = b.incoming(CHAT_PROTOCOL).unwrap();
        network.set_unreachable(&peer_b, true);
        let err = a
            .open_stream(&peer_b, CHAT_PROTOCOL)
            .await
            .err()
            .expect("peer is unreachable");
        assert!(matches!(err, TransportError::Unreachable { .. }));

        assert_eq!(network.dial_attempts(&peer_b), 3);
    }

    #[tokio::test]
    async fn test_second_handler_is_rejected() {
        let network = MemoryNetwork::new();
        let a = network.host(PeerId::new("peerA"));
        let _first = a.incoming(CHAT_PROTOCOL).unwrap();
        assert!(matches!(
            a.incoming(CHAT_PROTOCOL),
            Err(TransportError::HandlerExists(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_lookup_failures() {
        let network = MemoryNetwork::new();
        let key = DiscoveryKey::derive("room");
        let directory = network.directory(PeerId::new("peerA"));

        network.fail_lookups(2);
        assert!(directory.lookup(&key).await.is_err());
        assert!(directory.lookup(&key).await.is_err());
        assert!(directory.lookup(&key).await.is_ok());
    }

    #[test]
    fn test_remember_ignores_self() {
        let network = MemoryNetwork::new();
        let a = network.host(PeerId::new("peerA"));
        a.remember(&PeerDescriptor::new("peerA", a.local_addresses()));
        assert!(a.known_peers().is_empty());
    }
}

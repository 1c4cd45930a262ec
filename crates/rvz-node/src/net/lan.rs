//! UDP provider directory for one local network
//!
//! `announce` sends an `Announce` datagram to the configured target (usually
//! the limited broadcast address) and remembers the key; a background task
//! republishes every remembered key each `interval`. A receive task records
//! the announcements of other peers. `lookup` answers from that table,
//! ignoring records older than the TTL.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use rvz_core::config::ChatConfig;
use rvz_core::error::DirectoryError;
use rvz_core::traits::ProviderDirectory;
use rvz_core::{DiscoveryKey, PeerDescriptor, PeerId};
use rvz_protocol::{decode_datagram, encode_datagram, Message, MAX_PAYLOAD_SIZE, HEADER_SIZE};

use super::resolve_advertised;

/// Socket and timing settings for a [`LanDirectory`]
#[derive(Debug, Clone)]
pub struct LanOptions {
    /// Local UDP port to receive announcements on
    pub port: u16,
    /// Where announcements are sent
    pub target: SocketAddr,
    /// Republish period
    pub interval: Duration,
    /// Lifetime of a record that is not refreshed
    pub ttl: Duration,
}

impl LanOptions {
    /// Options from the node configuration
    pub fn from_config(config: &ChatConfig) -> Result<Self, DirectoryError> {
        let target = config.announce_target.parse().map_err(|_| {
            DirectoryError::Unavailable(format!(
                "invalid announce target {:?}",
                config.announce_target
            ))
        })?;

        Ok(Self {
            port: config.announce_port,
            target,
            interval: config.announce_interval,
            ttl: config.provider_ttl,
        })
    }
}

#[derive(Debug, Clone)]
struct ProviderRecord {
    addresses: Vec<SocketAddr>,
    last_seen: Instant,
}

/// Provider records keyed by discovery key and peer, with expiry
#[derive(Debug, Default)]
pub struct ProviderTable {
    records: DashMap<(DiscoveryKey, PeerId), ProviderRecord>,
}

impl ProviderTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a record
    pub fn upsert(&self, key: DiscoveryKey, descriptor: PeerDescriptor, seen: Instant) {
        self.records.insert(
            (key, descriptor.id),
            ProviderRecord {
                addresses: descriptor.addresses,
                last_seen: seen,
            },
        );
    }

    /// Records for `key` younger than `ttl` at `now`, pruning expired ones
    pub fn live(&self, key: &DiscoveryKey, ttl: Duration, now: Instant) -> Vec<PeerDescriptor> {
        self.records
            .retain(|_, record| now.saturating_duration_since(record.last_seen) < ttl);

        let mut found: Vec<PeerDescriptor> = self
            .records
            .iter()
            .filter(|entry| &entry.key().0 == key)
            .map(|entry| PeerDescriptor::new(entry.key().1.clone(), entry.value().addresses.clone()))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// Number of stored records, expired ones included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct LanShared {
    identity: PeerId,
    addresses: Vec<SocketAddr>,
    socket: UdpSocket,
    options: LanOptions,
    table: ProviderTable,
    announced: DashSet<DiscoveryKey>,
}

impl LanShared {
    async fn send_announce(&self, key: &DiscoveryKey) -> Result<(), DirectoryError> {
        let datagram = encode_datagram(Message::Announce {
            key: *key.as_bytes(),
            peer_id: self.identity.to_string(),
            addrs: self.addresses.clone(),
        })?;
        self.socket.send_to(&datagram, self.options.target).await?;
        Ok(())
    }
}

/// [`ProviderDirectory`] over UDP broadcast
pub struct LanDirectory {
    shared: Arc<LanShared>,
}

impl LanDirectory {
    /// Bind the directory socket and start the receive and republish tasks
    ///
    /// `addresses` are the stream addresses advertised for this peer.
    pub async fn bind(
        identity: PeerId,
        addresses: Vec<SocketAddr>,
        options: LanOptions,
        cancel: CancellationToken,
    ) -> Result<Self, DirectoryError> {
        let socket = UdpSocket::from_std(make_socket(options.port)?)?;
        tracing::info!(
            local = %socket.local_addr()?,
            target = %options.target,
            "LAN directory bound"
        );

        let shared = Arc::new(LanShared {
            identity,
            addresses,
            socket,
            options,
            table: ProviderTable::new(),
            announced: DashSet::new(),
        });

        tokio::spawn(receive_loop(Arc::clone(&shared), cancel.clone()));
        tokio::spawn(republish_loop(Arc::clone(&shared), cancel));

        Ok(Self { shared })
    }

    /// Local address of the directory socket
    pub fn local_addr(&self) -> Result<SocketAddr, DirectoryError> {
        Ok(self.shared.socket.local_addr()?)
    }
}

#[async_trait]
impl ProviderDirectory for LanDirectory {
    async fn announce(&self, key: &DiscoveryKey) -> Result<(), DirectoryError> {
        self.shared.announced.insert(*key);
        self.shared.send_announce(key).await
    }

    async fn lookup(&self, key: &DiscoveryKey) -> Result<Vec<PeerDescriptor>, DirectoryError> {
        let shared = &self.shared;
        let mut found = shared.table.live(key, shared.options.ttl, Instant::now());
        if shared.announced.contains(key) {
            found.push(PeerDescriptor::new(shared.identity.clone(), shared.addresses.clone()));
        }
        Ok(found)
    }
}

/// UDP socket that shares its port with other local directories
fn make_socket(port: u16) -> Result<std::net::UdpSocket, DirectoryError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind_addr.into())?;

    Ok(socket.into())
}

async fn receive_loop(shared: Arc<LanShared>, cancel: CancellationToken) {
    let mut buf = vec![0u8; HEADER_SIZE + MAX_PAYLOAD_SIZE];

    loop {
        let (len, sender) = tokio::select! {
            _ = cancel.cancelled() => break,
            result = shared.socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "recv_from failed");
                    continue;
                }
            },
        };

        let (key, peer_id, addrs) = match decode_datagram(&buf[..len]) {
            Ok(Message::Announce { key, peer_id, addrs }) => (key, peer_id, addrs),
            Ok(other) => {
                tracing::trace!(%sender, kind = ?other.message_type(), "ignoring datagram");
                continue;
            }
            Err(e) => {
                tracing::trace!(%sender, error = %e, "malformed datagram");
                continue;
            }
        };

        let peer = PeerId::new(peer_id);
        if peer == shared.identity {
            continue;
        }

        let addresses = resolve_advertised(&addrs, sender.ip());
        tracing::debug!(peer = %peer, %sender, "provider announcement received");
        shared.table.upsert(
            DiscoveryKey::from_bytes(key),
            PeerDescriptor::new(peer, addresses),
            Instant::now(),
        );
    }
}

async fn republish_loop(shared: Arc<LanShared>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(shared.options.interval);
    // The first tick completes immediately and announce already sent one
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let keys: Vec<DiscoveryKey> = shared.announced.iter().map(|k| *k).collect();
                for key in keys {
                    if let Err(e) = shared.send_announce(&key).await {
                        tracing::warn!(error = %e, "republish failed");
                    }
                }
            }
        }
    }
}

//! TCP host
//!
//! Each chat stream is its own TCP connection. The dialing side sends a
//! framed `Hello` naming its identity and the application protocol; the
//! accepting side answers `HelloAck` when a handler for that protocol is
//! registered and `Reject` otherwise. After the acknowledgement the
//! connection carries raw newline-delimited text.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use rvz_core::error::TransportError;
use rvz_core::traits::{BoxedStream, Host, InboundStream};
use rvz_core::{PeerDescriptor, PeerId};
use rvz_protocol::{FrameCodec, Message, ProtocolError, PROTOCOL_VERSION};

use super::resolve_advertised;

/// Capacity of each inbound stream channel
const INBOUND_QUEUE: usize = 64;

struct Shared {
    identity: PeerId,
    peers: DashMap<PeerId, Vec<SocketAddr>>,
    handlers: DashMap<String, mpsc::Sender<InboundStream>>,
    handshake_timeout: Duration,
}

/// [`Host`] over plain TCP
pub struct TcpHost {
    shared: Arc<Shared>,
    listen_addr: SocketAddr,
    advertised: Vec<SocketAddr>,
}

impl TcpHost {
    /// Bind the listener and start accepting streams until `cancel` fires
    pub async fn bind(
        identity: PeerId,
        addr: &str,
        handshake_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let listen_addr = listener.local_addr()?;
        let advertised = advertised_addresses(listen_addr);

        tracing::info!(%listen_addr, ?advertised, "chat listener bound");

        let shared = Arc::new(Shared {
            identity,
            peers: DashMap::new(),
            handlers: DashMap::new(),
            handshake_timeout,
        });
        tokio::spawn(accept_loop(listener, Arc::clone(&shared), cancel));

        Ok(Self {
            shared,
            listen_addr,
            advertised,
        })
    }

    /// Address the listener is bound to
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    async fn handshake(
        &self,
        peer: &PeerId,
        addr: SocketAddr,
        protocol: &str,
    ) -> Result<BoxedStream, TransportError> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;

        let mut framed = Framed::new(socket, FrameCodec::new());
        framed
            .send(Message::hello(
                self.shared.identity.as_str(),
                protocol,
                self.advertised.clone(),
            ))
            .await?;

        match framed.next().await {
            Some(Ok(Message::HelloAck { peer_id })) if peer_id == peer.as_str() => into_stream(framed),
            Some(Ok(Message::HelloAck { peer_id })) => Err(TransportError::Unreachable {
                peer: peer.clone(),
                reason: format!("{} answered as {}", addr, peer_id),
            }),
            Some(Ok(Message::Reject { reason })) => {
                tracing::debug!(peer = %peer, %reason, "stream rejected");
                Err(TransportError::ProtocolRejected {
                    peer: peer.clone(),
                    protocol: protocol.to_string(),
                })
            }
            Some(Ok(other)) => Err(ProtocolError::UnexpectedMessage(other.message_type()).into()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ProtocolError::Closed.into()),
        }
    }
}

#[async_trait]
impl Host for TcpHost {
    fn local_identity(&self) -> &PeerId {
        &self.shared.identity
    }

    fn local_addresses(&self) -> Vec<SocketAddr> {
        self.advertised.clone()
    }

    fn known_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.shared.peers.iter().map(|e| e.key().clone()).collect();
        peers.sort();
        peers
    }

    fn known_addresses(&self, peer: &PeerId) -> Vec<SocketAddr> {
        self.shared
            .peers
            .get(peer)
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn remember(&self, peer: &PeerDescriptor) {
        remember(&self.shared, peer);
    }

    async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &str,
    ) -> Result<BoxedStream, TransportError> {
        let addrs = self.known_addresses(peer);
        if addrs.is_empty() {
            return Err(TransportError::NoAddresses(peer.clone()));
        }

        let mut last_error = None;
        for addr in addrs {
            match self.handshake(peer, addr, protocol).await {
                Ok(stream) => return Ok(stream),
                // The peer answered; other addresses will not change its mind
                Err(e @ TransportError::ProtocolRejected { .. }) => return Err(e),
                Err(e) => {
                    tracing::debug!(peer = %peer, %addr, error = %e, "address failed");
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Unreachable {
            peer: peer.clone(),
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no address answered".to_string()),
        })
    }

    fn incoming(&self, protocol: &str) -> Result<mpsc::Receiver<InboundStream>, TransportError> {
        match self.shared.handlers.entry(protocol.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TransportError::HandlerExists(protocol.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
                slot.insert(tx);
                Ok(rx)
            }
        }
    }
}

fn remember(shared: &Shared, peer: &PeerDescriptor) {
    if peer.id != shared.identity && peer.is_dialable() {
        shared.peers.insert(peer.id.clone(), peer.addresses.clone());
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("chat listener shutting down");
                break;
            }
            result = listener.accept() => match result {
                Ok((socket, remote)) => {
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(e) = accept_stream(&shared, socket, remote).await {
                            tracing::warn!(%remote, error = %e, "inbound handshake failed");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            },
        }
    }
}

async fn accept_stream(
    shared: &Shared,
    socket: TcpStream,
    remote: SocketAddr,
) -> Result<(), TransportError> {
    socket.set_nodelay(true)?;
    let mut framed = Framed::new(socket, FrameCodec::new());

    let first = tokio::time::timeout(shared.handshake_timeout, framed.next())
        .await
        .map_err(|_| TransportError::Timeout(PeerId::new(remote.to_string())))?;

    let (peer, protocol, version, listen_addrs) = match first {
        Some(Ok(Message::Hello {
            peer_id,
            protocol,
            version,
            listen_addrs,
        })) => (PeerId::new(peer_id), protocol, version, listen_addrs),
        Some(Ok(other)) => {
            return Err(ProtocolError::UnexpectedMessage(other.message_type()).into())
        }
        Some(Err(e)) => return Err(e.into()),
        None => return Err(ProtocolError::Closed.into()),
    };

    if version != PROTOCOL_VERSION {
        tracing::debug!(peer = %peer, %version, "peer speaks a different protocol version");
    }

    let handler = shared.handlers.get(&protocol).map(|tx| tx.clone());
    let Some(handler) = handler else {
        framed
            .send(Message::Reject {
                reason: format!("unsupported protocol {}", protocol),
            })
            .await?;
        return Err(TransportError::ProtocolRejected { peer, protocol });
    };

    framed
        .send(Message::HelloAck {
            peer_id: shared.identity.to_string(),
        })
        .await?;
    let stream = into_stream(framed)?;

    remember(
        shared,
        &PeerDescriptor::new(peer.clone(), resolve_advertised(&listen_addrs, remote.ip())),
    );

    handler
        .send(InboundStream { peer, stream })
        .await
        .map_err(|e| TransportError::Unreachable {
            peer: e.0.peer,
            reason: "no longer accepting chat streams".to_string(),
        })
}

/// Unwrap a finished handshake into a raw stream
fn into_stream(framed: Framed<TcpStream, FrameCodec>) -> Result<BoxedStream, TransportError> {
    let parts = framed.into_parts();
    if !parts.read_buf.is_empty() {
        return Err(ProtocolError::TrailingData(parts.read_buf.len()).into());
    }
    Ok(Box::new(parts.io))
}

/// Addresses to advertise for a listener bound to `listen_addr`
fn advertised_addresses(listen_addr: SocketAddr) -> Vec<SocketAddr> {
    if !listen_addr.ip().is_unspecified() {
        return vec![listen_addr];
    }

    let port = listen_addr.port();
    let mut addrs = Vec::new();
    if let Some(ip) = primary_ipv4() {
        addrs.push(SocketAddr::new(ip, port));
    }
    addrs.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    addrs
}

/// Address of the interface carrying the default route, if any
fn primary_ipv4() -> Option<IpAddr> {
    // Connecting a UDP socket only selects a route; nothing is sent
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

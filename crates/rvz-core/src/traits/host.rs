//! Host transport trait

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::{PeerDescriptor, PeerId};

/// A bidirectional ordered byte channel to one peer
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DuplexStream for T {}

/// Owned, type-erased duplex stream
pub type BoxedStream = Box<dyn DuplexStream>;

/// A stream a remote peer opened towards this host
pub struct InboundStream {
    /// Identity the remote peer presented
    pub peer: PeerId,
    /// The stream itself
    pub stream: BoxedStream,
}

impl std::fmt::Debug for InboundStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundStream")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// The local end of the secure transport: identity, peer store and streams
#[async_trait]
pub trait Host: Send + Sync {
    /// This process's own stable identity
    fn local_identity(&self) -> &PeerId;

    /// Addresses this host accepts streams on
    fn local_addresses(&self) -> Vec<SocketAddr>;

    /// Every peer the peer store has addresses for
    fn known_peers(&self) -> Vec<PeerId>;

    /// Best-effort list of previously seen addresses for a peer
    fn known_addresses(&self, peer: &PeerId) -> Vec<SocketAddr>;

    /// Record a peer's addresses in the peer store
    fn remember(&self, peer: &PeerDescriptor);

    /// Open an outbound stream to a known peer under an application protocol
    async fn open_stream(&self, peer: &PeerId, protocol: &str)
        -> Result<BoxedStream, TransportError>;

    /// Register interest in inbound streams for `protocol`
    ///
    /// Every stream a remote peer opens under `protocol` is delivered on the
    /// returned channel. Registering the same protocol twice is an error.
    fn incoming(&self, protocol: &str) -> Result<mpsc::Receiver<InboundStream>, TransportError>;
}

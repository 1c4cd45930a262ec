//! Provider directory trait

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::key::DiscoveryKey;
use crate::types::PeerDescriptor;

/// Key-based provider storage and lookup (a DHT or a LAN equivalent)
///
/// Implementations need not bound their own running time; callers wrap each
/// call in `tokio::time::timeout`.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    /// Publish this host as a provider of `key`
    ///
    /// Must be idempotent: announcing the same key again is harmless.
    async fn announce(&self, key: &DiscoveryKey) -> Result<(), DirectoryError>;

    /// Return the currently known providers of `key`, possibly none
    ///
    /// The result may include this host itself and descriptors without
    /// addresses; callers filter both.
    async fn lookup(&self, key: &DiscoveryKey) -> Result<Vec<PeerDescriptor>, DirectoryError>;
}

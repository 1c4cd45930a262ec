//! Shared node state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use rvz_core::config::ChatConfig;
use rvz_core::traits::Host;
use rvz_core::{DiscoveryKey, PeerId};

use crate::connection::ConnectionRegistry;
use crate::console::Console;

/// State shared by the discovery loop, the acceptor, read pumps and the shell
pub struct NodeState {
    /// Configuration
    pub config: ChatConfig,
    /// Key derived from the rendezvous string
    pub key: DiscoveryKey,
    /// Local end of the transport
    pub host: Arc<dyn Host>,
    /// Live connections
    pub registry: Arc<ConnectionRegistry>,
    /// Console output
    pub console: Console,
    /// Cancelled once on shutdown; every background task watches it
    pub cancel: CancellationToken,
}

impl NodeState {
    /// Create node state, deriving the discovery key from the configuration
    pub fn new(config: ChatConfig, host: Arc<dyn Host>, console: Console) -> Self {
        Self::with_cancel(config, host, console, CancellationToken::new())
    }

    /// Like [`NodeState::new`], sharing an existing shutdown token
    pub fn with_cancel(
        config: ChatConfig,
        host: Arc<dyn Host>,
        console: Console,
        cancel: CancellationToken,
    ) -> Self {
        let key = DiscoveryKey::derive(&config.rendezvous);
        Self {
            config,
            key,
            host,
            registry: Arc::new(ConnectionRegistry::new()),
            console,
            cancel,
        }
    }

    /// Identity of this node
    pub fn local_id(&self) -> &PeerId {
        self.host.local_identity()
    }

    /// Print the per-direction connection counts
    pub fn report_counts(&self) {
        self.console.connection_counts(self.registry.counts());
    }
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState")
            .field("local_id", self.local_id())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

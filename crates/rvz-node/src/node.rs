//! Chat node wiring

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rvz_core::config::ChatConfig;
use rvz_core::traits::{Host, ProviderDirectory};
use rvz_core::RvzError;
use rvz_protocol::CHAT_PROTOCOL;

use crate::connection;
use crate::console::{ChatShell, Console};
use crate::discovery::DiscoveryLoop;
use crate::session;
use crate::state::NodeState;

/// Background tasks of a started node
#[derive(Debug)]
pub struct NodeTasks {
    pub acceptor: JoinHandle<()>,
    pub discovery: JoinHandle<()>,
}

impl NodeTasks {
    /// Wait for both tasks to finish (after cancellation)
    pub async fn join(self) {
        if let Err(e) = self.acceptor.await {
            tracing::warn!(error = %e, "acceptor task failed");
        }
        if let Err(e) = self.discovery.await {
            tracing::warn!(error = %e, "discovery task failed");
        }
    }
}

/// A chat participant: host, directory, registry and console tied together
pub struct ChatNode {
    state: Arc<NodeState>,
    directory: Arc<dyn ProviderDirectory>,
}

impl ChatNode {
    /// Create a node; nothing runs until [`ChatNode::start`]
    pub fn new(
        config: ChatConfig,
        host: Arc<dyn Host>,
        directory: Arc<dyn ProviderDirectory>,
        console: Console,
    ) -> Self {
        Self::with_cancel(config, host, directory, console, CancellationToken::new())
    }

    /// Create a node that stops when `cancel` fires
    ///
    /// Lets the host and directory share the node's shutdown signal.
    pub fn with_cancel(
        config: ChatConfig,
        host: Arc<dyn Host>,
        directory: Arc<dyn ProviderDirectory>,
        console: Console,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: Arc::new(NodeState::with_cancel(config, host, console, cancel)),
            directory,
        }
    }

    /// Shared node state
    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    /// Accept inbound streams, announce, then start discovery
    ///
    /// Fails if the chat protocol handler cannot be registered or the
    /// announce does not succeed before its deadline. The node is cancelled
    /// on failure.
    pub async fn start(&self) -> Result<NodeTasks, RvzError> {
        let incoming = self.state.host.incoming(CHAT_PROTOCOL)?;
        let acceptor = tokio::spawn(session::run_acceptor(Arc::clone(&self.state), incoming));

        let discovery = DiscoveryLoop::new(Arc::clone(&self.state), Arc::clone(&self.directory));
        if let Err(e) = discovery.announce().await {
            self.state.cancel.cancel();
            return Err(e.into());
        }

        let discovery = tokio::spawn(discovery.run());
        tracing::info!(id = %self.state.local_id(), "chat node started");

        Ok(NodeTasks {
            acceptor,
            discovery,
        })
    }

    /// Shell reading local input for this node
    pub fn shell(&self) -> ChatShell {
        ChatShell::new(Arc::clone(&self.state))
    }

    /// Stop every background task and close outbound streams
    pub async fn shutdown(&self) {
        self.state.cancel.cancel();
        let closed = connection::close_outbound(&self.state.registry).await;
        tracing::debug!(closed, "outbound streams closed");
    }
}

//! Discovery loop
//!
//! Announces this node under the discovery key once at startup, then keeps
//! querying the provider directory and opens an outbound chat stream to
//! every provider it is not yet connected to.
//!
//! Announcing retries with backoff until `announce_deadline` runs out, after
//! which the error is returned to the caller (startup treats it as fatal).
//! Polling never gives up: failed lookups are logged and retried with
//! backoff until the node is cancelled. Dials run in their own tasks so a
//! slow peer never delays the next lookup; the registry claim keeps a peer
//! from being dialed twice meanwhile.

mod backoff;

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use rvz_core::error::{DirectoryError, RegistryError, TransportError};
use rvz_core::traits::ProviderDirectory;
use rvz_core::{ConnectionId, PeerDescriptor};

use crate::session;
use crate::state::NodeState;

pub use backoff::ExponentialBackoff;

/// What one polling iteration did
#[derive(Debug, Default)]
pub struct PollReport {
    /// Provider records returned by the directory
    pub found: usize,
    /// Records naming this node
    pub skipped_self: usize,
    /// Records without addresses
    pub skipped_unusable: usize,
    /// Peers already connected outbound
    pub already_connected: usize,
    /// Peers another task is already dialing
    pub in_flight: usize,
    /// Dials started by this iteration
    pub dials: Vec<JoinHandle<Result<ConnectionId, TransportError>>>,
}

impl PollReport {
    /// Wait for the dials started by this iteration
    pub async fn settle(self) -> Vec<Result<ConnectionId, TransportError>> {
        join_all(self.dials)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }
}

/// Background discovery for one node
pub struct DiscoveryLoop {
    state: Arc<NodeState>,
    directory: Arc<dyn ProviderDirectory>,
}

impl DiscoveryLoop {
    /// Create a discovery loop over `directory`
    pub fn new(state: Arc<NodeState>, directory: Arc<dyn ProviderDirectory>) -> Self {
        Self { state, directory }
    }

    /// Publish this node as a provider of the discovery key
    pub async fn announce(&self) -> Result<(), DirectoryError> {
        let config = &self.state.config;
        let deadline = Instant::now().checked_add(config.announce_deadline);
        let mut backoff = ExponentialBackoff::from_config(&config.backoff);

        loop {
            let attempt = timeout(config.announce_timeout, self.directory.announce(&self.state.key));
            let error = match attempt.await {
                Ok(Ok(())) => {
                    tracing::info!(key = %self.state.key, "announced under discovery key");
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(_) => DirectoryError::Timeout(config.announce_timeout),
            };

            let delay = backoff.next_delay();
            // No deadline means the configured budget is beyond what Instant can hold
            let out_of_time = match (Instant::now().checked_add(delay), deadline) {
                (Some(retry_at), Some(deadline)) => retry_at >= deadline,
                (None, _) => true,
                (Some(_), None) => false,
            };
            if out_of_time {
                tracing::error!(error = %error, attempts = backoff.failures(), "giving up on announce");
                return Err(error);
            }
            tracing::warn!(error = %error, retry_in = ?delay, "announce failed");

            tokio::select! {
                _ = self.state.cancel.cancelled() => {
                    return Err(DirectoryError::Unavailable("shut down while announcing".to_string()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Query the directory once, bounded by the lookup timeout
    pub async fn lookup(&self) -> Result<Vec<PeerDescriptor>, DirectoryError> {
        let limit = self.state.config.lookup_timeout;
        match timeout(limit, self.directory.lookup(&self.state.key)).await {
            Ok(result) => result,
            Err(_) => Err(DirectoryError::Timeout(limit)),
        }
    }

    /// Run one polling iteration
    pub async fn poll_once(&self) -> Result<PollReport, DirectoryError> {
        let providers = self.lookup().await?;
        let local_id = self.state.local_id();
        let mut report = PollReport {
            found: providers.len(),
            ..PollReport::default()
        };

        for descriptor in providers {
            if &descriptor.id == local_id {
                report.skipped_self += 1;
                continue;
            }
            if !descriptor.is_dialable() {
                tracing::debug!(peer = %descriptor.id, "provider without addresses, skipping");
                report.skipped_unusable += 1;
                continue;
            }

            self.state.host.remember(&descriptor);

            let claim = match self.state.registry.claim_outbound(&descriptor.id) {
                Ok(claim) => claim,
                Err(RegistryError::AlreadyConnected(_)) => {
                    report.already_connected += 1;
                    continue;
                }
                Err(RegistryError::DialInProgress(_)) => {
                    report.in_flight += 1;
                    continue;
                }
            };

            tracing::debug!(peer = %descriptor.id, "found new provider, dialing");
            let state = Arc::clone(&self.state);
            report.dials.push(tokio::spawn(async move {
                let peer = claim.peer().clone();
                let result = session::open_outbound(&state, claim).await;
                if let Err(e) = &result {
                    tracing::warn!(peer = %peer, error = %e, "failed to open chat stream");
                }
                result
            }));
        }

        Ok(report)
    }

    /// Poll until the node is cancelled
    ///
    /// A lookup already in progress when cancellation arrives is allowed to
    /// finish; its time bound keeps shutdown prompt.
    pub async fn run(self) {
        let mut backoff = ExponentialBackoff::from_config(&self.state.config.backoff);
        tracing::debug!("discovery loop started");

        while !self.state.cancel.is_cancelled() {
            let pause = match self.poll_once().await {
                Ok(report) => {
                    backoff.reset();
                    tracing::trace!(
                        found = report.found,
                        dialing = report.dials.len(),
                        connected = report.already_connected,
                        "discovery iteration"
                    );
                    self.state.config.poll_interval
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %e, retry_in = ?delay, "provider lookup failed");
                    delay
                }
            };

            tokio::select! {
                _ = self.state.cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::debug!("discovery loop stopped");
    }
}

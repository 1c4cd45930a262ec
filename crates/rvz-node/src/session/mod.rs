//! Stream sessions
//!
//! A session is one registered connection plus the read pump that drains
//! it. Outbound sessions also contribute a [`LineWriter`] to the broadcast
//! set; inbound streams are only read.

mod pump;

use std::sync::Arc;

use tokio::sync::mpsc;

use rvz_core::error::TransportError;
use rvz_core::traits::{BoxedStream, InboundStream};
use rvz_core::{ConnectionId, Direction, PeerId};
use rvz_protocol::CHAT_PROTOCOL;

use crate::connection::{LineWriter, OutboundClaim};
use crate::state::NodeState;

pub use pump::{run_read_pump, PumpExit, RepeatFilter, StreamFault, MAX_CONSECUTIVE_FAULTS};

/// Register an opened outbound stream and start its read pump
pub fn start_outbound(
    state: &Arc<NodeState>,
    claim: OutboundClaim,
    stream: BoxedStream,
) -> ConnectionId {
    let peer = claim.peer().clone();
    let (read, write) = tokio::io::split(stream);
    let writer = Arc::new(LineWriter::new(
        peer.clone(),
        write,
        state.config.max_line_length,
    ));

    let id = state.registry.add_outbound(claim, writer);
    tokio::spawn(run_read_pump(
        Arc::clone(state),
        peer.clone(),
        Direction::Outbound,
        id,
        read,
    ));

    tracing::info!(peer = %peer, connection = %id, "outbound stream established");
    state.report_counts();
    id
}

/// Register a stream a remote peer opened and start its read pump
pub fn start_inbound(state: &Arc<NodeState>, inbound: InboundStream) -> ConnectionId {
    let InboundStream { peer, stream } = inbound;

    let id = state.registry.add_inbound(&peer);
    tokio::spawn(run_read_pump(
        Arc::clone(state),
        peer.clone(),
        Direction::Inbound,
        id,
        stream,
    ));

    tracing::info!(peer = %peer, connection = %id, "inbound stream accepted");
    state.report_counts();
    id
}

/// Open a chat stream for a claimed peer and register it
///
/// The attempt is bounded by the configured dial timeout. On failure the
/// claim is dropped, which releases the peer for a later attempt.
pub async fn open_outbound(
    state: &Arc<NodeState>,
    claim: OutboundClaim,
) -> Result<ConnectionId, TransportError> {
    let peer = claim.peer().clone();
    let open = state.host.open_stream(&peer, CHAT_PROTOCOL);

    let stream = match tokio::time::timeout(state.config.dial_timeout, open).await {
        Ok(result) => result?,
        Err(_) => return Err(TransportError::Timeout(peer)),
    };

    Ok(start_outbound(state, claim, stream))
}

/// Connect outbound to `peer` unless already connected or being dialed
///
/// Returns `Ok(None)` when the peer needs no new connection.
pub async fn dial(
    state: &Arc<NodeState>,
    peer: &PeerId,
) -> Result<Option<ConnectionId>, TransportError> {
    let claim = match state.registry.claim_outbound(peer) {
        Ok(claim) => claim,
        Err(e) => {
            tracing::debug!(peer = %peer, reason = %e, "dial skipped");
            return Ok(None);
        }
    };

    open_outbound(state, claim).await.map(Some)
}

/// Accept inbound chat streams until shutdown or until the host stops
pub async fn run_acceptor(state: Arc<NodeState>, mut incoming: mpsc::Receiver<InboundStream>) {
    tracing::debug!("inbound acceptor started");

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            next = incoming.recv() => match next {
                Some(inbound) => {
                    start_inbound(&state, inbound);
                }
                None => {
                    tracing::debug!("host stopped delivering inbound streams");
                    break;
                }
            },
        }
    }

    tracing::debug!("inbound acceptor stopped");
}

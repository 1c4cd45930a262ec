//! Fan-out of local chat lines to every outbound stream

use futures::future::join_all;

use rvz_core::{Direction, PeerId};

use super::registry::ConnectionRegistry;

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Handles that accepted the line
    pub delivered: usize,
    /// Peers whose write failed and were dropped from the registry
    pub dropped: Vec<PeerId>,
}

/// Write `line` to every registered outbound handle
///
/// Writes to different handles run concurrently. A handle whose write fails
/// is removed from the registry; the others are unaffected.
pub async fn broadcast(registry: &ConnectionRegistry, line: &str) -> BroadcastReport {
    let handles = registry.broadcast_handles();
    if handles.is_empty() {
        tracing::debug!("no outbound connections, line not sent");
        return BroadcastReport::default();
    }

    let writes = handles.iter().map(|handle| async move {
        let result = handle.writer.send_line(line).await;
        (handle, result)
    });

    let mut report = BroadcastReport::default();
    for (handle, result) in join_all(writes).await {
        match result {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::warn!(peer = %handle.peer, error = %e, "write failed, dropping connection");
                registry.remove(&handle.peer, Direction::Outbound, handle.id);
                report.dropped.push(handle.peer.clone());
            }
        }
    }

    report
}

/// Close the write direction of every outbound stream
///
/// Remote read pumps see end of stream. Returns the number of streams closed
/// cleanly.
pub async fn close_outbound(registry: &ConnectionRegistry) -> usize {
    let handles = registry.broadcast_handles();
    let closes = handles.iter().map(|handle| handle.writer.shutdown());

    let mut closed = 0;
    for (handle, result) in handles.iter().zip(join_all(closes).await) {
        match result {
            Ok(()) => closed += 1,
            Err(e) => {
                tracing::debug!(peer = %handle.writer.peer(), error = %e, "close failed");
            }
        }
    }
    closed
}

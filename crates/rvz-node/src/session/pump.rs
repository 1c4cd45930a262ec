//! Read pump: drains one stream and prints its lines

use std::io::ErrorKind;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodecError};

use rvz_core::{ConnectionId, Direction, PeerId};
use rvz_protocol::chat_line_codec;

use crate::state::NodeState;

/// Transient faults in a row after which the stream is treated as dead
pub const MAX_CONSECUTIVE_FAULTS: u32 = 8;

/// Whether a read error ends the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFault {
    /// The stream is gone; stop reading and deregister
    Terminal,
    /// The stream may still deliver data
    Transient,
}

impl StreamFault {
    /// Classify a line codec error
    pub fn classify(error: &LinesCodecError) -> Self {
        match error {
            LinesCodecError::MaxLineLengthExceeded => StreamFault::Transient,
            LinesCodecError::Io(e) => match e.kind() {
                ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::NotConnected => StreamFault::Terminal,
                _ => StreamFault::Transient,
            },
        }
    }
}

/// Suppresses a log message identical to the one logged just before it
#[derive(Debug, Default)]
pub struct RepeatFilter {
    last: Option<String>,
}

impl RepeatFilter {
    /// Returns true if `message` differs from the previous admitted message
    pub fn admit(&mut self, message: &str) -> bool {
        if self.last.as_deref() == Some(message) {
            return false;
        }
        self.last = Some(message.to_string());
        true
    }
}

/// Why a read pump stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// Shutdown was requested
    Cancelled,
    /// The remote side closed the stream
    Closed,
    /// The stream failed
    Failed(String),
}

/// Read lines from `reader` until the stream ends or the node shuts down
///
/// Non-empty lines are printed as received. When the stream ends or fails,
/// the connection is removed from the registry before returning.
pub async fn run_read_pump<R>(
    state: Arc<NodeState>,
    peer: PeerId,
    direction: Direction,
    id: ConnectionId,
    reader: R,
) -> PumpExit
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, chat_line_codec(state.config.max_line_length));
    let mut errors = RepeatFilter::default();
    let mut faults = 0u32;
    // FramedRead yields a single None after an error before it resumes
    let mut resuming = false;

    let exit = loop {
        let next = tokio::select! {
            _ = state.cancel.cancelled() => break PumpExit::Cancelled,
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) => {
                faults = 0;
                resuming = false;
                if !line.is_empty() {
                    state.console.remote_line(&line);
                }
            }
            Some(Err(e)) => {
                let message = e.to_string();
                if errors.admit(&message) {
                    tracing::warn!(peer = %peer, %direction, error = %message, "read error");
                }

                if StreamFault::classify(&e) == StreamFault::Terminal {
                    break PumpExit::Failed(message);
                }
                faults += 1;
                if faults >= MAX_CONSECUTIVE_FAULTS {
                    break PumpExit::Failed(message);
                }
                resuming = true;
            }
            None if resuming => resuming = false,
            None => break PumpExit::Closed,
        }
    };

    if exit != PumpExit::Cancelled {
        if state.registry.remove(&peer, direction, id) {
            state.report_counts();
        }
        tracing::info!(peer = %peer, %direction, connection = %id, reason = ?exit, "stream ended");
    }

    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncWriteExt, ReadBuf};

    use crate::console::{Console, ConsoleBuffer};
    use crate::net::memory::MemoryNetwork;

    fn test_state() -> (Arc<NodeState>, ConsoleBuffer) {
        let network = MemoryNetwork::new();
        let host = network.host(PeerId::new("me"));
        let (console, buffer) = Console::buffered("me ", false);
        let config = rvz_core::config::ChatConfig {
            rendezvous: "room".to_string(),
            max_line_length: 32,
            ..Default::default()
        };
        (Arc::new(NodeState::new(config, host, console)), buffer)
    }

    /// Reader that fails with the same error forever
    struct Failing(ErrorKind);

    impl AsyncRead for Failing {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(self.0, "boom")))
        }
    }

    #[test]
    fn test_classify() {
        let reset = LinesCodecError::Io(io::Error::from(ErrorKind::ConnectionReset));
        assert_eq!(StreamFault::classify(&reset), StreamFault::Terminal);

        let eof = LinesCodecError::Io(io::Error::from(ErrorKind::UnexpectedEof));
        assert_eq!(StreamFault::classify(&eof), StreamFault::Terminal);

        let other = LinesCodecError::Io(io::Error::from(ErrorKind::Other));
        assert_eq!(StreamFault::classify(&other), StreamFault::Transient);

        assert_eq!(
            StreamFault::classify(&LinesCodecError::MaxLineLengthExceeded),
            StreamFault::Transient
        );
    }

    #[test]
    fn test_repeat_filter() {
        let mut filter = RepeatFilter::default();
        assert!(filter.admit("a"));
        assert!(!filter.admit("a"));
        assert!(filter.admit("b"));
        assert!(filter.admit("a"));
    }

    #[tokio::test]
    async fn test_lines_printed_and_eof_removes_connection() {
        let (state, buffer) = test_state();
        let peer = PeerId::new("peerA");
        let id = state.registry.add_inbound(&peer);

        let (reader, mut remote) = tokio::io::duplex(256);
        remote.write_all(b"peerA hello\n\npeerA again\n").await.unwrap();
        drop(remote);

        let exit = run_read_pump(Arc::clone(&state), peer.clone(), Direction::Inbound, id, reader).await;
        assert_eq!(exit, PumpExit::Closed);
        assert!(!state.registry.is_inbound_connected(&peer));

        let out = buffer.contents();
        assert!(out.contains("\npeerA hello\nme "));
        assert!(out.contains("\npeerA again\nme "));
        // The empty line is not printed
        assert!(!out.contains("\n\nme "));
    }

    #[tokio::test]
    async fn test_over_long_line_is_skipped() {
        let (state, buffer) = test_state();
        let peer = PeerId::new("peerA");
        let id = state.registry.add_inbound(&peer);

        let (reader, mut remote) = tokio::io::duplex(256);
        let long = format!("peerA {}\n", "x".repeat(64));
        remote.write_all(long.as_bytes()).await.unwrap();
        remote.write_all(b"peerA short\n").await.unwrap();
        drop(remote);

        let exit = run_read_pump(Arc::clone(&state), peer, Direction::Inbound, id, reader).await;
        assert_eq!(exit, PumpExit::Closed);

        let out = buffer.contents();
        assert!(out.contains("peerA short"));
        assert!(!out.contains("xxxx"));
    }

    #[tokio::test]
    async fn test_terminal_error_stops_pump() {
        let (state, _buffer) = test_state();
        let peer = PeerId::new("peerA");
        let id = state.registry.add_inbound(&peer);

        let exit = run_read_pump(
            Arc::clone(&state),
            peer.clone(),
            Direction::Inbound,
            id,
            Failing(ErrorKind::ConnectionReset),
        )
        .await;

        assert!(matches!(exit, PumpExit::Failed(_)));
        assert_eq!(state.registry.counts().inbound, 0);
    }

    #[tokio::test]
    async fn test_repeated_transient_errors_stop_pump() {
        let (state, _buffer) = test_state();
        let peer = PeerId::new("peerA");
        let id = state.registry.add_inbound(&peer);

        let exit = run_read_pump(
            Arc::clone(&state),
            peer,
            Direction::Inbound,
            id,
            Failing(ErrorKind::Other),
        )
        .await;

        assert!(matches!(exit, PumpExit::Failed(_)));
        assert_eq!(state.registry.counts().inbound, 0);
    }

    #[tokio::test]
    async fn test_cancel_keeps_registration() {
        let (state, _buffer) = test_state();
        let peer = PeerId::new("peerA");
        let id = state.registry.add_inbound(&peer);

        let (reader, _remote) = tokio::io::duplex(256);
        state.cancel.cancel();

        let exit = run_read_pump(Arc::clone(&state), peer.clone(), Direction::Inbound, id, reader).await;
        assert_eq!(exit, PumpExit::Cancelled);
        assert!(state.registry.is_inbound_connected(&peer));
    }
}

//! Write side of an outbound chat stream

use futures::SinkExt;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedWrite, LinesCodec, LinesCodecError};

use rvz_core::traits::BoxedStream;
use rvz_core::PeerId;
use rvz_protocol::chat_line_codec;

/// Line-oriented writer shared by every broadcaster
///
/// The per-writer lock makes each line a single complete write: concurrent
/// broadcasts never interleave partial lines on the same stream.
pub struct LineWriter {
    peer: PeerId,
    sink: Mutex<FramedWrite<WriteHalf<BoxedStream>, LinesCodec>>,
}

impl LineWriter {
    /// Wrap the write half of a stream
    pub fn new(peer: PeerId, half: WriteHalf<BoxedStream>, max_line_length: usize) -> Self {
        Self {
            peer,
            sink: Mutex::new(FramedWrite::new(half, chat_line_codec(max_line_length))),
        }
    }

    /// Peer at the other end
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Write one line (a newline is appended) and flush it
    pub async fn send_line(&self, line: &str) -> Result<(), LinesCodecError> {
        let mut sink = self.sink.lock().await;
        sink.send(line).await
    }

    /// Close the write direction of the stream
    pub async fn shutdown(&self) -> std::io::Result<()> {
        let mut sink = self.sink.lock().await;
        sink.get_mut().shutdown().await
    }
}

impl std::fmt::Debug for LineWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineWriter").field("peer", &self.peer).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn writer_pair(peer: &str) -> (Arc<LineWriter>, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(1024);
        let stream: BoxedStream = Box::new(local);
        let (_read, write) = tokio::io::split(stream);
        (Arc::new(LineWriter::new(PeerId::new(peer), write, 1024)), remote)
    }

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let (writer, remote) = writer_pair("peer-a");
        writer.send_line("X hello").await.unwrap();

        let mut lines = BufReader::new(remote).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "X hello");
    }

    #[tokio::test]
    async fn test_concurrent_sends_keep_lines_whole() {
        let (writer, remote) = writer_pair("peer-a");

        let mut tasks = Vec::new();
        for i in 0..20 {
            let writer = Arc::clone(&writer);
            tasks.push(tokio::spawn(async move {
                let line = format!("sender-{} {}", i, "x".repeat(200));
                writer.send_line(&line).await.unwrap();
            }));
        }

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(remote).lines();
            let mut seen = Vec::new();
            while seen.len() < 20 {
                seen.push(lines.next_line().await.unwrap().unwrap());
            }
            seen
        });

        for task in tasks {
            task.await.unwrap();
        }
        let seen = reader.await.unwrap();
        for line in seen {
            let (sender, body) = line.split_once(' ').unwrap();
            assert!(sender.starts_with("sender-"));
            assert_eq!(body, "x".repeat(200));
        }
    }

    #[tokio::test]
    async fn test_send_fails_after_remote_dropped() {
        let (writer, remote) = writer_pair("peer-a");
        drop(remote);
        assert!(writer.send_line("X hello").await.is_err());
    }
}

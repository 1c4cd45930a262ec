//! Interactive chat shell

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use rvz_protocol::ChatLine;

use super::commands::{CommandTable, COMMAND_ESCAPE};
use crate::connection::broadcast;
use crate::state::NodeState;

/// What the shell should do after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Keep reading input
    Continue,
    /// Stop the node
    Quit,
}

/// Reads local input, runs commands and broadcasts chat text
pub struct ChatShell {
    state: Arc<NodeState>,
    commands: CommandTable,
}

impl ChatShell {
    /// Shell with the builtin command table
    pub fn new(state: Arc<NodeState>) -> Self {
        Self::with_commands(state, CommandTable::builtin())
    }

    /// Shell with a custom command table
    pub fn with_commands(state: Arc<NodeState>, commands: CommandTable) -> Self {
        Self { state, commands }
    }

    /// Shared node state
    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    /// Handle one line of local input (trailing line terminator optional)
    pub async fn handle_line(&self, raw: &str) -> LineOutcome {
        let line = raw.trim_end_matches(&['\r', '\n'][..]);

        if line.is_empty() {
            self.state.console.prompt();
            return LineOutcome::Continue;
        }

        if line.starts_with(COMMAND_ESCAPE) {
            return self.commands.dispatch(self, line).await;
        }

        let text = ChatLine::new(self.state.local_id().as_str(), line).to_string();
        let report = broadcast(&self.state.registry, &text).await;
        if report.dropped.is_empty() {
            self.state.console.prompt();
        } else {
            self.state.report_counts();
        }

        LineOutcome::Continue
    }

    /// Process input until it ends, `\quit` is entered or the node is cancelled
    ///
    /// Cancels the node before returning.
    pub async fn run<R>(&self, input: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        self.state.console.prompt();

        let result = loop {
            let next = tokio::select! {
                _ = self.state.cancel.cancelled() => break Ok(()),
                next = lines.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    if self.handle_line(&line).await == LineOutcome::Quit {
                        tracing::debug!("quit requested");
                        break Ok(());
                    }
                }
                Ok(None) => {
                    tracing::debug!("end of input");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.state.cancel.cancel();
        result
    }
}

impl std::fmt::Debug for ChatShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatShell")
            .field("state", &self.state)
            .field("commands", &self.commands)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    use crate::connection::LineWriter;
    use crate::console::{Console, ConsoleBuffer};
    use crate::net::memory::MemoryNetwork;
    use rvz_core::config::ChatConfig;
    use rvz_core::traits::BoxedStream;
    use rvz_core::PeerId;

    fn shell(id: &str) -> (ChatShell, ConsoleBuffer) {
        let network = MemoryNetwork::new();
        let host = network.host(PeerId::new(id));
        let (console, buffer) = Console::buffered(format!("{} ", id), false);
        let config = ChatConfig {
            rendezvous: "room".to_string(),
            ..ChatConfig::default()
        };
        (
            ChatShell::new(Arc::new(NodeState::new(config, host, console))),
            buffer,
        )
    }

    fn add_writer(shell: &ChatShell, peer: &str) -> tokio::io::DuplexStream {
        let (local, remote) = tokio::io::duplex(256);
        let stream: BoxedStream = Box::new(local);
        let (_read, write) = tokio::io::split(stream);
        let writer = Arc::new(LineWriter::new(PeerId::new(peer), write, 1024));
        shell
            .state()
            .registry
            .try_add_outbound(&PeerId::new(peer), writer)
            .unwrap();
        remote
    }

    async fn read_line(remote: tokio::io::DuplexStream) -> String {
        let mut lines = BufReader::new(remote).lines();
        lines.next_line().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_empty_line_reprints_prompt() {
        let (shell, buffer) = shell("X");
        let _remote = add_writer(&shell, "peerA");

        assert_eq!(shell.handle_line("\n").await, LineOutcome::Continue);
        assert_eq!(buffer.take(), "X ");
    }

    #[tokio::test]
    async fn test_chat_text_reaches_every_outbound_handle() {
        let (shell, _buffer) = shell("X");
        let a = add_writer(&shell, "peerA");
        let b = add_writer(&shell, "peerB");

        shell.handle_line("hello\n").await;

        assert_eq!(read_line(a).await, "X hello");
        assert_eq!(read_line(b).await, "X hello");
    }

    #[tokio::test]
    async fn test_dead_handle_is_dropped_and_counts_reported() {
        let (shell, buffer) = shell("X");
        let a = add_writer(&shell, "peerA");
        drop(add_writer(&shell, "peerB"));

        shell.handle_line("hello").await;

        assert_eq!(read_line(a).await, "X hello");
        assert_eq!(shell.state().registry.counts().outbound, 1);
        assert!(buffer
            .take()
            .contains("Inbound Connections: 0 Outbound Connections: 1"));
    }

    #[tokio::test]
    async fn test_run_stops_on_quit_and_cancels() {
        let (shell, _buffer) = shell("X");
        let a = add_writer(&shell, "peerA");

        let input = BufReader::new(&b"hi there\n\\quit\nnot sent\n"[..]);
        shell.run(input).await.unwrap();

        assert!(shell.state().cancel.is_cancelled());
        let mut lines = BufReader::new(a).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "X hi there");
    }

    #[tokio::test]
    async fn test_run_stops_at_end_of_input() {
        let (shell, buffer) = shell("X");
        shell.run(BufReader::new(&b""[..])).await.unwrap();
        assert!(shell.state().cancel.is_cancelled());
        assert_eq!(buffer.take(), "X ");
    }
}

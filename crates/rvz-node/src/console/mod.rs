//! Console output and the interactive shell
//!
//! Every task that prints goes through one [`Console`], so remote lines,
//! command output and the prompt never interleave mid-line.

mod commands;
mod shell;

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::ConnectionCounts;

pub use commands::{CommandHandler, CommandSpec, CommandTable, COMMAND_ESCAPE};
pub use shell::{ChatShell, LineOutcome};

const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

struct ConsoleInner {
    out: Box<dyn Write + Send>,
    prompt: String,
    color: bool,
}

impl ConsoleInner {
    fn emit(&mut self, text: &str) {
        // Nowhere left to report a failing terminal
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

/// Shared handle to the process console
#[derive(Clone)]
pub struct Console {
    inner: Arc<Mutex<ConsoleInner>>,
}

impl Console {
    fn with_writer(out: Box<dyn Write + Send>, prompt: impl Into<String>, color: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConsoleInner {
                out,
                prompt: prompt.into(),
                color,
            })),
        }
    }

    /// Console writing to standard output
    pub fn stdout(prompt: impl Into<String>, color: bool) -> Self {
        Self::with_writer(Box::new(std::io::stdout()), prompt, color)
    }

    /// Console writing to an in-memory buffer
    pub fn buffered(prompt: impl Into<String>, color: bool) -> (Self, ConsoleBuffer) {
        let buffer = ConsoleBuffer::default();
        let console = Self::with_writer(Box::new(buffer.clone()), prompt, color);
        (console, buffer)
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Print the prompt
    pub fn prompt(&self) {
        let mut inner = self.lock();
        let prompt = inner.prompt.clone();
        inner.emit(&prompt);
    }

    /// Print one line
    pub fn line(&self, text: &str) {
        self.lock().emit(&format!("{}\n", text));
    }

    /// Print a block of lines followed by the prompt
    pub fn lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        for line in lines {
            text.push_str(line.as_ref());
            text.push('\n');
        }

        let mut inner = self.lock();
        text.push_str(&inner.prompt);
        inner.emit(&text);
    }

    /// Print a line received from a peer, then restore the prompt
    pub fn remote_line(&self, line: &str) {
        let mut inner = self.lock();
        let text = if inner.color {
            format!("\n{}{}{}\n{}", GREEN, line, RESET, inner.prompt)
        } else {
            format!("\n{}\n{}", line, inner.prompt)
        };
        inner.emit(&text);
    }

    /// Print the per-direction connection counts
    pub fn connection_counts(&self, counts: ConnectionCounts) {
        let mut inner = self.lock();
        let text = format!(
            "\rInbound Connections: {} Outbound Connections: {}\n{}",
            counts.inbound, counts.outbound, inner.prompt
        );
        inner.emit(&text);
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Console")
            .field("prompt", &inner.prompt)
            .field("color", &inner.color)
            .finish_non_exhaustive()
    }
}

/// In-memory console sink, readable while the console is in use
#[derive(Clone, Default)]
pub struct ConsoleBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ConsoleBuffer {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Everything written so far, clearing the buffer
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for ConsoleBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_line_is_green_then_prompt() {
        let (console, buffer) = Console::buffered("me ", true);
        console.remote_line("peerA hello");
        assert_eq!(buffer.take(), "\n\x1b[32mpeerA hello\x1b[0m\nme ");
    }

    #[test]
    fn test_remote_line_without_color() {
        let (console, buffer) = Console::buffered("me ", false);
        console.remote_line("peerA hello");
        assert_eq!(buffer.take(), "\npeerA hello\nme ");
    }

    #[test]
    fn test_lines_end_with_prompt() {
        let (console, buffer) = Console::buffered("me ", false);
        console.lines(["<ID>: me", "<ADDR 0>: 127.0.0.1:1"]);
        assert_eq!(buffer.contents(), "<ID>: me\n<ADDR 0>: 127.0.0.1:1\nme ");
    }

    #[test]
    fn test_connection_counts() {
        let (console, buffer) = Console::buffered("me ", false);
        console.connection_counts(ConnectionCounts {
            inbound: 2,
            outbound: 1,
        });
        assert!(buffer
            .take()
            .contains("Inbound Connections: 2 Outbound Connections: 1"));
    }
}

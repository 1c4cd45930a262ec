//! Chat commands
//!
//! Lines starting with [`COMMAND_ESCAPE`] are commands. The first
//! whitespace-separated token selects the entry in the [`CommandTable`]; the
//! remaining tokens are its arguments. Unknown and empty commands print the
//! usage table.

use std::collections::BTreeMap;

use futures::future::BoxFuture;

use rvz_core::PeerId;

use super::shell::{ChatShell, LineOutcome};
use crate::session;

/// Prefix marking a line as a command
pub const COMMAND_ESCAPE: char = '\\';

/// Signature shared by every command handler
pub type CommandHandler = for<'a> fn(&'a ChatShell, &'a [String]) -> BoxFuture<'a, LineOutcome>;

/// One command table entry
#[derive(Clone, Copy)]
pub struct CommandSpec {
    /// Usage text shown in the usage table
    pub usage: &'static str,
    /// Handler invoked with the arguments after the command name
    pub handler: CommandHandler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec").field("usage", &self.usage).finish()
    }
}

/// Command name to handler mapping, built once at startup
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: BTreeMap<&'static str, CommandSpec>,
}

impl CommandTable {
    /// Empty table
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The standard chat commands
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register("host", "\\host", host);
        table.register("chat", "\\chat", host);
        table.register("connections", "\\connections [w|r]", connections);
        table.register("con", "\\con", connection_count);
        table.register("peer", "\\peer <peer id>", peer);
        table.register("addpeer", "\\addpeer <peer id>", add_peer);
        table.register("quit", "\\quit", quit);
        table
    }

    /// Add or replace an entry
    pub fn register(&mut self, name: &'static str, usage: &'static str, handler: CommandHandler) {
        self.entries.insert(name, CommandSpec { usage, handler });
    }

    /// Look up a command by name
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.entries.get(name)
    }

    /// One `<CMD USAGE>:` line per entry, ordered by name
    pub fn usage_lines(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|spec| format!("<CMD USAGE>: {}", spec.usage))
            .collect()
    }

    /// Parse and run a command line (escape prefix included)
    ///
    /// Surrounding spaces and any number of escape characters around the
    /// command are ignored, so `\\quit` behaves like `\quit`.
    pub async fn dispatch(&self, shell: &ChatShell, line: &str) -> LineOutcome {
        let body = line.trim_matches(' ').trim_matches(COMMAND_ESCAPE);
        let mut tokens = body.split_whitespace();

        let spec = tokens.next().and_then(|name| self.get(name));
        match spec {
            Some(spec) => {
                let args: Vec<String> = tokens.map(str::to_string).collect();
                (spec.handler)(shell, &args).await
            }
            None => {
                shell.state().console.lines(self.usage_lines());
                LineOutcome::Continue
            }
        }
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn wrong_format(shell: &ChatShell, usage: &str) {
    shell
        .state()
        .console
        .lines([format!("ERROR: wrong format: e.g. \"{}\"", usage)]);
}

/// Find `id` in the local peer store
fn known_peer(shell: &ChatShell, id: &str) -> Option<PeerId> {
    shell
        .state()
        .host
        .known_peers()
        .into_iter()
        .find(|p| p.as_str() == id)
}

fn host<'a>(shell: &'a ChatShell, _args: &'a [String]) -> BoxFuture<'a, LineOutcome> {
    Box::pin(async move {
        let state = shell.state();
        let mut out = vec![format!("<ID>: {}", state.local_id())];
        for (i, addr) in state.host.local_addresses().iter().enumerate() {
            out.push(format!("<ADDR {}>: {}", i, addr));
        }
        state.console.lines(out);
        LineOutcome::Continue
    })
}

fn connections<'a>(shell: &'a ChatShell, args: &'a [String]) -> BoxFuture<'a, LineOutcome> {
    Box::pin(async move {
        let snapshot = shell.state().registry.snapshot();
        let filter = args.first().map(String::as_str).unwrap_or("");
        let show_write = !filter.starts_with('r');
        let show_read = !filter.starts_with('w');

        let mut out = Vec::new();
        if show_write {
            for (i, peer) in snapshot.outbound.iter().enumerate() {
                out.push(format!("<WRITE_CONNECTIONS>: {}: {}", i, peer));
            }
        }
        if show_read {
            for (i, peer) in snapshot.inbound.iter().enumerate() {
                out.push(format!("<READ_CONNECTIONS>: {}: {}", i, peer));
            }
        }

        shell.state().console.lines(out);
        LineOutcome::Continue
    })
}

fn connection_count<'a>(shell: &'a ChatShell, _args: &'a [String]) -> BoxFuture<'a, LineOutcome> {
    Box::pin(async move {
        let counts = shell.state().registry.counts();
        shell.state().console.lines([format!(
            "<NUM_CONN>: Inbound: {} Outbound: {}",
            counts.inbound, counts.outbound
        )]);
        LineOutcome::Continue
    })
}

fn peer<'a>(shell: &'a ChatShell, args: &'a [String]) -> BoxFuture<'a, LineOutcome> {
    Box::pin(async move {
        let state = shell.state();
        let Some(id) = args.first() else {
            wrong_format(shell, "\\peer <peer id>");
            return LineOutcome::Continue;
        };
        let Some(peer) = known_peer(shell, id) else {
            state.console.lines([format!("ERROR: unknown peer \"{}\"", id)]);
            return LineOutcome::Continue;
        };

        let mut out = vec![format!("<ID>: {}", peer)];
        for (i, addr) in state.host.known_addresses(&peer).iter().enumerate() {
            out.push(format!("<ADDR {}>: {}", i, addr));
        }
        out.push(format!(
            "<WRITE CONNECTED>: {}",
            state.registry.is_outbound_connected(&peer)
        ));
        out.push(format!(
            "<READ CONNECTED>: {}",
            state.registry.is_inbound_connected(&peer)
        ));
        state.console.lines(out);
        LineOutcome::Continue
    })
}

fn add_peer<'a>(shell: &'a ChatShell, args: &'a [String]) -> BoxFuture<'a, LineOutcome> {
    Box::pin(async move {
        let state = shell.state();
        let Some(id) = args.first() else {
            wrong_format(shell, "\\addpeer <peer id>");
            return LineOutcome::Continue;
        };
        let Some(peer) = known_peer(shell, id) else {
            state.console.lines([format!("ERROR: unknown peer \"{}\"", id)]);
            return LineOutcome::Continue;
        };

        match session::dial(state, &peer).await {
            // The new session already printed the connection counts
            Ok(Some(_)) => {}
            Ok(None) => state.console.prompt(),
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "failed to open chat stream");
                state.console.prompt();
            }
        }
        LineOutcome::Continue
    })
}

fn quit<'a>(_shell: &'a ChatShell, _args: &'a [String]) -> BoxFuture<'a, LineOutcome> {
    Box::pin(async move { LineOutcome::Quit })
}

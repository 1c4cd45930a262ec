//! rvz-chat: peer-to-peer chat over a shared rendezvous string
//!
//! Peers started with the same rendezvous string find each other on the
//! local network and exchange lines of text. No server is involved.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rvz_core::config::{self, ChatConfig};
use rvz_core::traits::Host;
use rvz_core::PeerId;
use rvz_node::console::Console;
use rvz_node::net::{LanDirectory, LanOptions, TcpHost};
use rvz_node::ChatNode;

#[derive(Parser)]
#[command(name = "rvz-chat")]
#[command(about = "Peer-to-peer chat: peers sharing a rendezvous string find each other and talk")]
#[command(
    long_about = "Peer-to-peer chat: peers sharing a rendezvous string find each other and talk.\n\n\
                  Run rvz-chat with the same rendezvous string in two terminals (or on two \
                  machines of one network). Each peer announces itself, discovers the others \
                  and opens a chat stream to each of them. Type a line to send it to every \
                  connected peer; type \\ followed by Enter to list the commands."
)]
#[command(version)]
struct Args {
    /// Unique string identifying the group of peers to meet
    #[arg(short, long, env = "RVZ_RENDEZVOUS")]
    rendezvous: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to accept chat streams on (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// UDP port of the LAN provider directory (overrides config)
    #[arg(long)]
    announce_port: Option<u16>,

    /// Destination of directory announcements (overrides config)
    #[arg(long)]
    announce_target: Option<String>,

    /// Print remote lines without colour
    #[arg(long)]
    no_color: bool,

    /// Verbose logging (same as --log-level debug)
    #[arg(short, long)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never interleave with the prompt
    let log_level = if args.verbose { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    config.validate().context("Invalid configuration")?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let identity = PeerId::random();
    let host = TcpHost::bind(
        identity.clone(),
        &config.listen_address,
        config.dial_timeout,
        cancel.clone(),
    )
    .await
    .with_context(|| format!("Failed to listen on {}", config.listen_address))?;

    let options = LanOptions::from_config(&config)?;
    let directory = LanDirectory::bind(
        identity.clone(),
        host.local_addresses(),
        options,
        cancel.clone(),
    )
    .await
    .with_context(|| format!("Failed to bind directory port {}", config.announce_port))?;

    let console = Console::stdout(format!("{} ", identity), config.color);
    console.line(&format!("Starting chat for peer {:?} ...", identity.as_str()));

    let node = ChatNode::with_cancel(
        config,
        Arc::new(host),
        Arc::new(directory),
        console,
        cancel,
    );
    let tasks = node
        .start()
        .await
        .context("Failed to announce under the rendezvous key")?;

    let shell = node.shell();
    if let Err(e) = shell.run(BufReader::new(tokio::io::stdin())).await {
        tracing::error!(error = %e, "failed to read input");
    }

    node.shutdown().await;
    tasks.join().await;
    tracing::debug!("chat shut down");

    // A blocking stdin read would otherwise keep the runtime alive
    std::process::exit(0)
}

/// Configuration file (explicit, default location, or built-in defaults)
/// with command line overrides applied
fn load_config(args: &Args) -> Result<ChatConfig> {
    let mut config: ChatConfig = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ChatConfig::default()
            })
        } else {
            ChatConfig::default()
        }
    };

    if let Some(rendezvous) = &args.rendezvous {
        config.rendezvous = rendezvous.clone();
    }
    if let Some(listen) = &args.listen {
        config.listen_address = listen.clone();
    }
    if let Some(port) = args.announce_port {
        config.announce_port = port;
    }
    if let Some(target) = &args.announce_target {
        config.announce_target = target.clone();
    }
    if args.no_color {
        config.color = false;
    }

    Ok(config)
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }

        cancel.cancel();
    });
}

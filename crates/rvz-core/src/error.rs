//! Core error types for rvz

use std::path::PathBuf;
use std::time::Duration;

use rvz_protocol::ProtocolError;
use thiserror::Error;

use crate::types::PeerId;

/// Top-level error type for the rvz ecosystem
#[derive(Error, Debug)]
pub enum RvzError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Provider directory error
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Provider directory errors (announce / lookup)
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The operation did not finish within its time bound
    #[error("Directory operation timed out after {0:?}")]
    Timeout(Duration),

    /// The directory cannot serve requests right now
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// Malformed directory traffic
    #[error("Directory protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors opening or accepting streams
#[derive(Error, Debug)]
pub enum TransportError {
    /// No address is known for the peer
    #[error("No known addresses for {0}")]
    NoAddresses(PeerId),

    /// The peer could not be reached
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: PeerId, reason: String },

    /// The peer does not serve the requested protocol
    #[error("Peer {peer} rejected protocol {protocol}")]
    ProtocolRejected { peer: PeerId, protocol: String },

    /// Opening the stream took too long
    #[error("Timed out opening stream to {0}")]
    Timeout(PeerId),

    /// A handler for this protocol is already registered
    #[error("Protocol {0} already has a stream handler")]
    HandlerExists(String),

    /// Handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// An outbound connection to the peer already exists
    #[error("Already connected outbound to {0}")]
    AlreadyConnected(PeerId),

    /// Another task is currently dialing the peer
    #[error("Dial to {0} already in progress")]
    DialInProgress(PeerId),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

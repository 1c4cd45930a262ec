//! Protocol error types

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Invalid frame header
    #[error("Invalid frame header")]
    InvalidHeader,

    /// Unknown message type
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Datagram shorter than its header claims
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// A message arrived that is not valid at this point of the exchange
    #[error("Unexpected message: {0:?}")]
    UnexpectedMessage(crate::message::MessageType),

    /// Bytes arrived before the handshake finished
    #[error("{0} unexpected bytes before handshake completed")]
    TrailingData(usize),

    /// The remote side closed the stream mid-handshake
    #[error("Stream closed during handshake")]
    Closed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Line codec error
    #[error("Line error: {0}")]
    Line(#[from] LinesCodecError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

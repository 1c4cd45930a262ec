//! rvz-protocol: Wire protocol for rvz peers
//!
//! This crate defines the framed messages exchanged when a chat stream is
//! opened (handshake) and the datagrams used by the LAN provider directory.
//! Once a stream is established it carries plain newline-delimited text,
//! see [`line`].

pub mod codec;
pub mod error;
pub mod frame;
pub mod line;
pub mod message;

pub use codec::{decode_datagram, encode_datagram, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use line::{chat_line_codec, ChatLine, DEFAULT_MAX_LINE_LENGTH};
pub use message::{Message, MessageType, CHAT_PROTOCOL, PROTOCOL_VERSION};

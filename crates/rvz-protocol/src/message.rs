//! Message types for the rvz protocol
//!
//! Two exchanges use framed messages:
//!
//! 1. Stream handshake. The dialing side sends `Hello` naming the
//!    application protocol it wants; the accepting side answers `HelloAck`
//!    if it has a handler for that protocol, or `Reject` otherwise. After
//!    `HelloAck` the stream carries newline-delimited text only.
//! 2. Directory announcements. A peer providing a discovery key sends
//!    `Announce` datagrams; receivers record it as a provider of that key.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Current protocol version string.
///
/// Carried in `Hello` so incompatible peers can be told apart in logs.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Application protocol identifier for chat streams
pub const CHAT_PROTOCOL: &str = "/chat/1.1.0";

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Stream open request
    Hello = 0x01,
    /// Stream accepted
    HelloAck = 0x02,
    /// Stream refused
    Reject = 0x03,
    /// Provider announcement
    Announce = 0x04,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::HelloAck),
            0x03 => Some(Self::Reject),
            0x04 => Some(Self::Announce),
            _ => None,
        }
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Sent by the dialing side right after the transport connects
    Hello {
        /// Identity of the dialing peer
        peer_id: String,
        /// Application protocol requested (e.g. [`CHAT_PROTOCOL`])
        protocol: String,
        /// Wire protocol version, see [`PROTOCOL_VERSION`]
        version: String,
        /// Addresses the dialing peer accepts streams on
        listen_addrs: Vec<SocketAddr>,
    },

    /// Handshake accepted
    HelloAck {
        /// Identity of the accepting peer
        peer_id: String,
    },

    /// Handshake refused
    Reject {
        /// Human-readable reason
        reason: String,
    },

    /// Provider record for a discovery key
    Announce {
        /// Discovery key digest
        key: [u8; 32],
        /// Identity of the announcing peer
        peer_id: String,
        /// Addresses the announcing peer accepts streams on
        addrs: Vec<SocketAddr>,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello { .. } => MessageType::Hello,
            Message::HelloAck { .. } => MessageType::HelloAck,
            Message::Reject { .. } => MessageType::Reject,
            Message::Announce { .. } => MessageType::Announce,
        }
    }

    /// Build a `Hello` for the current protocol version
    pub fn hello(
        peer_id: impl Into<String>,
        protocol: impl Into<String>,
        listen_addrs: Vec<SocketAddr>,
    ) -> Self {
        Message::Hello {
            peer_id: peer_id.into(),
            protocol: protocol.into(),
            version: PROTOCOL_VERSION.to_string(),
            listen_addrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for msg_type in [
            MessageType::Hello,
            MessageType::HelloAck,
            MessageType::Reject,
            MessageType::Announce,
        ] {
            let recovered = MessageType::from_u8(msg_type.as_u8()).unwrap();
            assert_eq!(recovered, msg_type);
        }
        assert!(MessageType::from_u8(0x00).is_none());
    }

    #[test]
    fn test_hello_carries_current_version() {
        let hello = Message::hello("peer-a", CHAT_PROTOCOL, vec![]);
        match hello {
            Message::Hello {
                version, protocol, ..
            } => {
                assert_eq!(version, PROTOCOL_VERSION);
                assert_eq!(protocol, "/chat/1.1.0");
            }
            other => panic!("Expected Hello, got {:?}", other),
        }
    }
}

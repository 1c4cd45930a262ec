//! Tokio codec for framed protocol messages

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::message::Message;

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.payload_length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < payload_len {
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        let message: Message = bincode::deserialize(&payload)?;

        if message.message_type() != header.message_type {
            return Err(ProtocolError::InvalidHeader);
        }

        Ok(Some(message))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(&message)?;
        let payload_len = payload.len();

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        FrameHeader::new(message.message_type(), payload_len as u32).encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

/// Encode a single message as a self-contained datagram
pub fn encode_datagram(message: Message) -> Result<BytesMut, ProtocolError> {
    let mut buf = BytesMut::new();
    FrameCodec::new().encode(message, &mut buf)?;
    Ok(buf)
}

/// Decode a datagram produced by [`encode_datagram`]
///
/// Unlike the stream decoder, a datagram must contain exactly one complete
/// frame; truncated or padded datagrams are rejected.
pub fn decode_datagram(datagram: &[u8]) -> Result<Message, ProtocolError> {
    let mut buf = BytesMut::from(datagram);
    let mut codec = FrameCodec::new();

    match codec.decode(&mut buf)? {
        Some(message) if buf.is_empty() => Ok(message),
        Some(_) => Err(ProtocolError::InvalidHeader),
        None => Err(ProtocolError::IncompleteFrame {
            expected: codec
                .pending_header
                .map(|h| HEADER_SIZE + h.payload_length as usize)
                .unwrap_or(HEADER_SIZE),
            actual: datagram.len(),
        }),
    }
}

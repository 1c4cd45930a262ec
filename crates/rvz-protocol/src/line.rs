//! Newline-delimited chat text
//!
//! After the handshake a chat stream is a sequence of UTF-8 lines. Every
//! line a peer writes starts with the writer's own identity followed by a
//! single space; readers print the line as received and never re-derive the
//! sender locally.

use std::fmt;

use tokio_util::codec::LinesCodec;

/// Longest chat line accepted by default, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Build the codec used on established chat streams
///
/// Lines longer than `max_length` produce a recoverable decode error; the
/// codec skips ahead to the next newline.
pub fn chat_line_codec(max_length: usize) -> LinesCodec {
    LinesCodec::new_with_max_length(max_length)
}

/// One line of chat as written on the wire (without the trailing newline)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Identity the writer claims for itself
    pub sender: String,
    /// Message text
    pub text: String,
}

impl ChatLine {
    /// Create a new chat line
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sender, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    #[test]
    fn test_chat_line_display() {
        assert_eq!(ChatLine::new("X", "hello").to_string(), "X hello");
    }

    #[test]
    fn test_codec_appends_newline() {
        let mut codec = chat_line_codec(DEFAULT_MAX_LINE_LENGTH);
        let mut buf = BytesMut::new();
        codec
            .encode(ChatLine::new("X", "hello").to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"X hello\n");
    }

    #[test]
    fn test_codec_recovers_after_long_line() {
        let mut codec = chat_line_codec(8);
        let mut buf = BytesMut::from(&b"this line is far too long\nok\n"[..]);

        assert!(codec.decode(&mut buf).is_err());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("ok".to_string()));
    }
}

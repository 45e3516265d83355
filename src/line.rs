//! Line-based codec for tokio.
//!
//! Splits a byte stream into newline-terminated UTF-8 lines and rejects
//! lines that exceed the configured length or carry a NUL byte.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error;

/// Longest line accepted by default: 8191 bytes of tags plus a classic
/// 512-byte message body.
pub const MAX_LINE_LEN: usize = 8191 + 512;

/// Whether `ch` may never appear inside an IRC line.
#[inline]
pub(crate) fn is_illegal_control_char(ch: char) -> bool {
    ch == '\0'
}

/// Line-based codec that handles newline-terminated messages.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }
}

impl LineCodec {
    /// Create a codec accepting lines up to [`MAX_LINE_LEN`] bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with a custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }

    /// Validate that a line contains no illegal control characters.
    pub(crate) fn validate_line(s: &str) -> error::Result<()> {
        let trimmed = s.trim_end_matches(&['\r', '\n'][..]);
        match trimmed.chars().find(|&ch| is_illegal_control_char(ch)) {
            Some(ch) => Err(error::ProtocolError::IllegalControlChar(ch)),
            None => Ok(()),
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(error::ProtocolError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let data = String::from_utf8(line.to_vec())?;
            Self::validate_line(&data)?;
            Ok(Some(data))
        } else {
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(error::ProtocolError::MessageTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> error::Result<()> {
        dst.extend_from_slice(msg.as_bytes());
        Ok(())
    }
}

//! Line-delimited JSON codec for TCP framing.
//!
//! Every message is:
//! ```text
//! <UTF-8 JSON object>\n
//! ```
//!
//! Framing (finding the next `\n`-terminated line) and parsing (JSON text
//! into a typed [`Message`]) are deliberately separate failure domains:
//! a framing overrun is fatal to the session, a parse failure is not.

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;

use crate::config::MAX_FRAME_BYTES;
use crate::message::Message;

/// A line grew past the buffer bound without a terminator. Fatal to the
/// session.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("frame exceeded {limit} bytes with no terminator")]
pub struct FramingError {
    pub limit: usize,
}

/// A complete line failed to parse into a known, well-formed [`Message`].
/// Non-fatal: the caller responds with `ERROR 400` and keeps the session
/// open.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("missing message type")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("message missing or malformed fields: {0}")]
    InvalidFields(String),
}

impl ProtocolError {
    /// Protocol errors are always reported to the peer as code 400.
    pub fn code(&self) -> i32 {
        400
    }
}

/// Per-session line decoder. Never shared across sessions; each connection
/// owns one.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new frame decoder bounded at [`MAX_FRAME_BYTES`].
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_len: MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_len,
        }
    }

    /// Add data to the decoder buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to pull the next complete line (without its terminator) out of
    /// the buffer.
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all
    /// complete lines. `Err(_)` means the buffer grew past its bound with
    /// no terminator in sight.
    pub fn decode_next(&mut self) -> Result<Option<Bytes>, FramingError> {
        if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos); // drop the trailing '\n'
            return Ok(Some(line.freeze()));
        }

        if self.buffer.len() > self.max_len {
            return Err(FramingError {
                limit: self.max_len,
            });
        }

        Ok(None)
    }

    /// Get the current buffer length (for debugging).
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Encoder for building newline-delimited output frames.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    buffer: BytesMut,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Encode a message and append it to the output buffer.
    pub fn encode(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let bytes = encode_message(message)?;
        self.buffer.extend_from_slice(&bytes);
        Ok(())
    }

    /// Take the encoded bytes, leaving an empty buffer.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Parse a single decoded line into a [`Message`].
///
/// The `type` field is checked before full-struct deserialization so a
/// missing or unrecognized type produces a specific, loggable error rather
/// than a generic serde message.
pub fn decode_message(line: &[u8]) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_slice(line)?;
    let type_name = value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?;

    match type_name {
        "HANDSHAKE" | "HANDSHAKE_ACK" | "STATUS_UPDATE" | "ASSIGN_MISSION"
        | "MISSION_COMPLETE" | "HEARTBEAT" | "HEARTBEAT_RESPONSE" | "ERROR" => {
            serde_json::from_value(value).map_err(|e| ProtocolError::InvalidFields(e.to_string()))
        }
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

/// Encode a message as a single `\n`-terminated JSON line.
pub fn encode_message(message: &Message) -> Result<Bytes, ProtocolError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(Bytes::from(bytes))
}

/// Convenience wrapper bundling framing + parsing for the common case of
/// "give me the next fully-decoded message, if any."
#[derive(Debug, Default)]
pub struct MessageDecoder {
    frames: FrameDecoder,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self {
            frames: FrameDecoder::new(),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.frames.extend(data);
    }

    /// Returns `Ok(None)` when no complete line is buffered yet,
    /// `Ok(Some(Ok(message)))` on a well-formed frame, `Ok(Some(Err(_)))`
    /// on a malformed-but-complete frame (non-fatal), and `Err(_)` on a
    /// framing overrun (fatal).
    #[allow(clippy::type_complexity)]
    pub fn decode_next(&mut self) -> Result<Option<Result<Message, ProtocolError>>, FramingError> {
        match self.frames.decode_next()? {
            Some(line) => Ok(Some(decode_message(&line))),
            None => Ok(None),
        }
    }
}

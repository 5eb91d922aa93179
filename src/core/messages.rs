//! # Transport Messages
//!
//! The three transport-level messages exchanged outside the secure channel:
//! `Hello`, `Acknowledge`, and `Error`. Layouts are bit-exact with the
//! protocol: little-endian integers, strings as a signed 32-bit length
//! prefix followed by UTF-8 bytes (`-1` encodes a null string).

use crate::core::chunk::{build_frame, ChunkKind, Frame, MessageKind};
use crate::core::status::StatusCode;
use crate::error::{ChannelError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Protocol version sent in Hello and echoed in Acknowledge.
pub const PROTOCOL_VERSION: u32 = 0;

fn get_u32(buf: &mut &[u8], field: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(ChannelError::DecodingError(format!(
            "truncated field: {field}"
        )));
    }
    Ok(buf.get_u32_le())
}

fn get_string(buf: &mut &[u8], field: &str) -> Result<Option<String>> {
    if buf.remaining() < 4 {
        return Err(ChannelError::DecodingError(format!(
            "truncated field: {field}"
        )));
    }
    let len = buf.get_i32_le();
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(ChannelError::DecodingError(format!(
            "string length {len} exceeds remaining bytes in {field}"
        )));
    }
    let raw = buf[..len].to_vec();
    buf.advance(len);
    String::from_utf8(raw)
        .map(Some)
        .map_err(|e| ChannelError::DecodingError(format!("invalid UTF-8 in {field}: {e}")))
}

fn put_string(out: &mut BytesMut, value: &str) {
    out.put_i32_le(value.len() as i32);
    out.put_slice(value.as_bytes());
}

/// Client greeting: proposes protocol version and local receive limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    pub endpoint_url: String,
}

impl HelloMessage {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        Ok(HelloMessage {
            protocol_version: get_u32(&mut buf, "protocol_version")?,
            receive_buffer_size: get_u32(&mut buf, "receive_buffer_size")?,
            send_buffer_size: get_u32(&mut buf, "send_buffer_size")?,
            max_message_size: get_u32(&mut buf, "max_message_size")?,
            max_chunk_count: get_u32(&mut buf, "max_chunk_count")?,
            endpoint_url: get_string(&mut buf, "endpoint_url")?.unwrap_or_default(),
        })
    }

    pub fn to_frame(&self) -> Bytes {
        let mut body = BytesMut::new();
        body.put_u32_le(self.protocol_version);
        body.put_u32_le(self.receive_buffer_size);
        body.put_u32_le(self.send_buffer_size);
        body.put_u32_le(self.max_message_size);
        body.put_u32_le(self.max_chunk_count);
        put_string(&mut body, &self.endpoint_url);
        build_frame(MessageKind::Hello, ChunkKind::Final, &body)
    }
}

/// Server reply to Hello: the limits the server will honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

impl AcknowledgeMessage {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        Ok(AcknowledgeMessage {
            protocol_version: get_u32(&mut buf, "protocol_version")?,
            receive_buffer_size: get_u32(&mut buf, "receive_buffer_size")?,
            send_buffer_size: get_u32(&mut buf, "send_buffer_size")?,
            max_message_size: get_u32(&mut buf, "max_message_size")?,
            max_chunk_count: get_u32(&mut buf, "max_chunk_count")?,
        })
    }

    pub fn to_frame(&self) -> Bytes {
        let mut body = BytesMut::new();
        body.put_u32_le(self.protocol_version);
        body.put_u32_le(self.receive_buffer_size);
        body.put_u32_le(self.send_buffer_size);
        body.put_u32_le(self.max_message_size);
        body.put_u32_le(self.max_chunk_count);
        build_frame(MessageKind::Acknowledge, ChunkKind::Final, &body)
    }
}

/// Diagnostic error sent by a peer before it closes the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub error: StatusCode,
    pub reason: String,
}

impl ErrorMessage {
    pub fn new(error: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            error,
            reason: reason.into(),
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        let error = StatusCode::new(get_u32(&mut buf, "error")?);
        let reason = get_string(&mut buf, "reason")?.unwrap_or_default();
        Ok(ErrorMessage { error, reason })
    }

    /// Decode from a complete `ERR` frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::decode(frame.body())
    }

    pub fn to_frame(&self) -> Bytes {
        let mut body = BytesMut::new();
        body.put_u32_le(self.error.value());
        put_string(&mut body, &self.reason);
        build_frame(MessageKind::Error, ChunkKind::Final, &body)
    }
}

//! # Frame and Chunk Layout
//!
//! Message-type tags, chunk-kind markers, and the fixed frame header shared
//! by every message on the wire.
//!
//! ## Wire Format
//! ```text
//! [Type(3)] [ChunkKind(1)] [Length(4, LE)] [Body(N)]
//! ```
//!
//! Secure-message frames additionally carry, at the start of the body:
//! ```text
//! [SecureChannelId(4, LE)] [TokenId(4, LE)] [Payload] [SecurityEnvelope]
//! ```
//!
//! `Length` covers the entire frame including the 8-byte header. All
//! multi-byte integers are little-endian.

use crate::error::{ChannelError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the fixed frame header: type tag, chunk kind, length.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Header bytes preceding the symmetric security header of a secure message:
/// the frame header plus the secure channel id.
pub const SECURE_HEADER_SIZE: usize = 12;

/// Size of the symmetric security header (token id).
pub const SYMMETRIC_SECURITY_HEADER_SIZE: usize = 4;

/// Offset of the payload within a secure-message chunk.
pub const SECURE_PAYLOAD_OFFSET: usize = SECURE_HEADER_SIZE + SYMMETRIC_SECURITY_HEADER_SIZE;

/// The message types this layer understands. Frames carrying any other tag
/// are passed through to the next layer unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Hello,
    Acknowledge,
    Error,
    OpenChannel,
    CloseChannel,
    SecureMessage,
}

impl MessageKind {
    /// The 3-byte ASCII tag written on the wire.
    pub const fn tag(self) -> [u8; 3] {
        match self {
            MessageKind::Hello => *b"HEL",
            MessageKind::Acknowledge => *b"ACK",
            MessageKind::Error => *b"ERR",
            MessageKind::OpenChannel => *b"OPN",
            MessageKind::CloseChannel => *b"CLO",
            MessageKind::SecureMessage => *b"MSG",
        }
    }

    /// Parse a wire tag. Returns `None` for unrecognized tags, which are
    /// forwarded rather than rejected.
    pub fn from_tag(tag: [u8; 3]) -> Option<Self> {
        match &tag {
            b"HEL" => Some(MessageKind::Hello),
            b"ACK" => Some(MessageKind::Acknowledge),
            b"ERR" => Some(MessageKind::Error),
            b"OPN" => Some(MessageKind::OpenChannel),
            b"CLO" => Some(MessageKind::CloseChannel),
            b"MSG" => Some(MessageKind::SecureMessage),
            _ => None,
        }
    }
}

/// Position of a chunk within a logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// More chunks of the same message follow.
    Intermediate,
    /// Last chunk of the message.
    Final,
    /// The sender abandoned the message; discard accumulated chunks.
    Abort,
}

impl ChunkKind {
    /// The marker byte written on the wire.
    pub const fn marker(self) -> u8 {
        match self {
            ChunkKind::Intermediate => b'C',
            ChunkKind::Final => b'F',
            ChunkKind::Abort => b'A',
        }
    }

    /// Parse a marker byte.
    pub fn from_marker(marker: u8) -> Result<Self> {
        match marker {
            b'C' => Ok(ChunkKind::Intermediate),
            b'F' => Ok(ChunkKind::Final),
            b'A' => Ok(ChunkKind::Abort),
            other => Err(ChannelError::InvalidChunkKind(other)),
        }
    }
}

/// The fixed 8-byte header at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw 3-byte message-type tag, kept verbatim so unrecognized frames can
    /// be forwarded unmodified.
    pub tag: [u8; 3],
    /// Raw chunk-kind marker byte.
    pub chunk_marker: u8,
    /// Total frame length including this header.
    pub length: u32,
}

impl FrameHeader {
    /// Parse the header from the first 8 bytes of a frame.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(ChannelError::DecodingError(format!(
                "frame header truncated: {} bytes",
                bytes.len()
            )));
        }

        Ok(FrameHeader {
            tag: [bytes[0], bytes[1], bytes[2]],
            chunk_marker: bytes[3],
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    /// The parsed message type, if this layer recognizes the tag.
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(self.tag)
    }

    /// The parsed chunk kind.
    pub fn chunk_kind(&self) -> Result<ChunkKind> {
        ChunkKind::from_marker(self.chunk_marker)
    }
}

/// A complete frame cut from the byte stream: parsed header plus the frame
/// bytes themselves, header included.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub bytes: Bytes,
}

impl Frame {
    /// The frame body after the fixed header.
    pub fn body(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_SIZE..]
    }
}

/// Assemble a complete frame from a type tag, chunk-kind marker, and body.
pub fn build_frame(kind: MessageKind, chunk: ChunkKind, body: &[u8]) -> Bytes {
    let length = FRAME_HEADER_SIZE + body.len();
    let mut out = BytesMut::with_capacity(length);
    out.put_slice(&kind.tag());
    out.put_u8(chunk.marker());
    out.put_u32_le(length as u32);
    out.put_slice(body);
    out.freeze()
}

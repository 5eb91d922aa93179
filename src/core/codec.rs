//! # Stream Framing
//!
//! Tokio codec that cuts the raw byte stream into complete frames.
//!
//! A frame is only produced once the full declared length has arrived;
//! partial frames stay buffered for the next read. The declared length is
//! validated against an absolute sanity bound before any allocation — the
//! configured per-channel chunk limits are enforced later, in the chunk
//! decoder, where violations map to the protocol's security status codes.

use crate::core::chunk::{Frame, FrameHeader, FRAME_HEADER_SIZE};
use crate::error::{ChannelError, Result};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Absolute upper bound on any single frame (16MB). Protects against memory
/// exhaustion from a hostile length field regardless of channel configuration.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Framing codec: decodes length-delimited frames, encodes pre-built frame
/// bytes verbatim.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Override the sanity bound, e.g. to the negotiated receive buffer size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let length =
            u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if length < FRAME_HEADER_SIZE || length > self.max_frame_size {
            return Err(ChannelError::BadFrameLength {
                length,
                max: self.max_frame_size,
            });
        }

        if src.len() < length {
            // Reserve up front so subsequent reads land in one allocation.
            src.reserve(length - src.len());
            return Ok(None);
        }

        let bytes = src.split_to(length).freeze();
        let header = FrameHeader::parse(&bytes)?;

        Ok(Some(Frame { header, bytes }))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ChannelError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chunk::{build_frame, ChunkKind, MessageKind};

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut codec = FrameCodec::new();
        let frame = build_frame(MessageKind::SecureMessage, ChunkKind::Final, b"hello");

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame[..frame.len() - 1]);

        assert!(codec.decode(&mut buf).expect("decode").is_none());
        assert_eq!(buf.len(), frame.len() - 1);

        buf.extend_from_slice(&frame[frame.len() - 1..]);
        let decoded = codec.decode(&mut buf).expect("decode").expect("frame");
        assert_eq!(decoded.bytes, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut codec = FrameCodec::new();
        let a = build_frame(MessageKind::SecureMessage, ChunkKind::Intermediate, b"a");
        let b = build_frame(MessageKind::SecureMessage, ChunkKind::Final, b"b");

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&a);
        buf.extend_from_slice(&b);

        let first = codec.decode(&mut buf).expect("decode").expect("frame");
        let second = codec.decode(&mut buf).expect("decode").expect("frame");
        assert_eq!(first.bytes, a);
        assert_eq!(second.bytes, b);
        assert!(codec.decode(&mut buf).expect("decode").is_none());
    }

    #[test]
    fn test_hostile_length_rejected_before_allocation() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"MSGF");
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ChannelError::BadFrameLength { .. })
        ));
    }

    #[test]
    fn test_undersized_length_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"MSGF");
        buf.extend_from_slice(&4u32.to_le_bytes());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ChannelError::BadFrameLength { .. })
        ));
    }

    #[test]
    fn test_encoder_writes_frames_verbatim() {
        let mut codec = FrameCodec::new();
        let frame = build_frame(MessageKind::Error, ChunkKind::Final, b"oops");

        let mut dst = BytesMut::new();
        codec.encode(frame.clone(), &mut dst).expect("encode");
        assert_eq!(&dst[..], &frame[..]);
    }
}

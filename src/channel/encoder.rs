//! # Chunk Encoder
//!
//! Splits one serialized message into an ordered sequence of secure chunks:
//! each chunk carries the frame header, the secure channel id, the *current*
//! token id, and a body protected by the channel's security provider. All
//! chunks but the last are marked intermediate; the last is marked final.
//!
//! The produced sequence must be written to the transport as one
//! uninterrupted unit — the serialization pipeline guarantees that by
//! encoding and handing off one message at a time.

use crate::channel::secure::SecureChannel;
use crate::channel::security::SecurityProvider;
use crate::config::ChannelLimits;
use crate::error::{ChannelError, Result};
use bytes::{BufMut, Bytes, BytesMut};

use crate::core::chunk::{ChunkKind, MessageKind, SECURE_PAYLOAD_OFFSET};

/// Encoder for outbound secure-message chunks.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    max_chunk_size: usize,
    max_chunk_count: usize,
    max_message_size: usize,
}

impl ChunkEncoder {
    /// Build an encoder from negotiated limits. Send-side bounds apply.
    pub fn new(limits: &ChannelLimits) -> Self {
        Self {
            max_chunk_size: limits.send_buffer_size as usize,
            max_chunk_count: limits.max_chunk_count as usize,
            max_message_size: limits.max_message_size as usize,
        }
    }

    /// Split, protect, and frame one message under the channel's current
    /// token. Returns the chunks in wire order.
    pub fn encode(
        &self,
        channel: &SecureChannel,
        provider: &dyn SecurityProvider,
        kind: MessageKind,
        message: &[u8],
    ) -> Result<Vec<Bytes>> {
        if self.max_message_size != 0 && message.len() > self.max_message_size {
            return Err(ChannelError::MessageTooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }

        let overhead = SECURE_PAYLOAD_OFFSET + provider.overhead();
        let max_body = self
            .max_chunk_size
            .checked_sub(overhead)
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                ChannelError::ConfigError(format!(
                    "chunk size {} cannot fit security overhead {}",
                    self.max_chunk_size, overhead
                ))
            })?;

        let chunk_count = message.len().div_ceil(max_body).max(1);
        if self.max_chunk_count != 0 && chunk_count > self.max_chunk_count {
            return Err(ChannelError::TooManyChunks {
                count: chunk_count,
                max: self.max_chunk_count,
            });
        }

        let channel_id = channel.channel_id();
        let token_id = channel.current_token().token_id;
        let keys = channel.current_keys();

        let mut chunks = Vec::with_capacity(chunk_count);
        for (index, part) in split_message(message, max_body).enumerate() {
            let chunk_kind = if index + 1 == chunk_count {
                ChunkKind::Final
            } else {
                ChunkKind::Intermediate
            };

            let body = provider.protect(keys, part)?;
            let length = SECURE_PAYLOAD_OFFSET + body.len();

            let mut out = BytesMut::with_capacity(length);
            out.put_slice(&kind.tag());
            out.put_u8(chunk_kind.marker());
            out.put_u32_le(length as u32);
            out.put_u32_le(channel_id);
            out.put_u32_le(token_id);
            out.put_slice(&body);
            chunks.push(out.freeze());
        }

        Ok(chunks)
    }
}

/// Split a message into bodies of at most `max_body` bytes. An empty message
/// still yields one (empty) part, so every message produces a final chunk.
fn split_message(message: &[u8], max_body: usize) -> impl Iterator<Item = &[u8]> {
    let empty = message.is_empty();
    message
        .chunks(max_body)
        .chain(std::iter::once(&message[0..0]).filter(move |_| empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::secure::TokenKeys;
    use crate::channel::security::{provider_for, SecurityMode};
    use crate::channel::token::SecurityToken;
    use crate::core::chunk::FRAME_HEADER_SIZE;
    use std::time::Duration;

    fn channel() -> SecureChannel {
        SecureChannel::new(
            7,
            SecurityMode::None,
            SecurityToken::new(11, Duration::from_secs(600)),
            TokenKeys {
                signing_key: vec![0x01; 32],
                encryption_key: vec![0x01; 32],
            },
        )
    }

    fn limits(chunk_size: u32, chunk_count: u32) -> ChannelLimits {
        ChannelLimits {
            receive_buffer_size: chunk_size,
            send_buffer_size: chunk_size,
            max_message_size: 0,
            max_chunk_count: chunk_count,
        }
    }

    #[test]
    fn test_small_message_is_single_final_chunk() {
        let encoder = ChunkEncoder::new(&limits(8_192, 0));
        let provider = provider_for(SecurityMode::None);

        let chunks = encoder
            .encode(&channel(), provider.as_ref(), MessageKind::SecureMessage, b"hello")
            .expect("encode");

        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][0..3], b"MSG");
        assert_eq!(chunks[0][3], b'F');
        assert_eq!(&chunks[0][SECURE_PAYLOAD_OFFSET..], b"hello");
    }

    #[test]
    fn test_chunks_are_stamped_with_channel_and_token_ids() {
        let encoder = ChunkEncoder::new(&limits(8_192, 0));
        let provider = provider_for(SecurityMode::None);

        let chunks = encoder
            .encode(&channel(), provider.as_ref(), MessageKind::SecureMessage, b"x")
            .expect("encode");

        let chunk = &chunks[0];
        let channel_id = u32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]);
        let token_id = u32::from_le_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]);
        assert_eq!(channel_id, 7);
        assert_eq!(token_id, 11);
    }

    #[test]
    fn test_large_message_splits_with_final_marker_last() {
        // 16 bytes of payload room per chunk.
        let encoder = ChunkEncoder::new(&limits((SECURE_PAYLOAD_OFFSET + 16) as u32, 0));
        let provider = provider_for(SecurityMode::None);

        let message = vec![0xAB; 40];
        let chunks = encoder
            .encode(&channel(), provider.as_ref(), MessageKind::SecureMessage, &message)
            .expect("encode");

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0][3], b'C');
        assert_eq!(chunks[1][3], b'C');
        assert_eq!(chunks[2][3], b'F');

        // No chunk exceeds the negotiated size.
        for chunk in &chunks {
            assert!(chunk.len() <= SECURE_PAYLOAD_OFFSET + 16);
        }
    }

    #[test]
    fn test_empty_message_still_produces_final_chunk() {
        let encoder = ChunkEncoder::new(&limits(8_192, 0));
        let provider = provider_for(SecurityMode::None);

        let chunks = encoder
            .encode(&channel(), provider.as_ref(), MessageKind::SecureMessage, b"")
            .expect("encode");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0][3], b'F');
        assert_eq!(chunks[0].len(), SECURE_PAYLOAD_OFFSET);
    }

    #[test]
    fn test_chunk_count_bound_enforced_on_encode() {
        let encoder = ChunkEncoder::new(&limits((SECURE_PAYLOAD_OFFSET + 8) as u32, 2));
        let provider = provider_for(SecurityMode::None);

        let result = encoder.encode(
            &channel(),
            provider.as_ref(),
            MessageKind::SecureMessage,
            &[0u8; 100],
        );
        assert!(matches!(result, Err(ChannelError::TooManyChunks { .. })));
    }

    #[test]
    fn test_chunk_size_smaller_than_overhead_is_config_error() {
        let encoder = ChunkEncoder::new(&limits(8, 0));
        let provider = provider_for(SecurityMode::SignAndEncrypt);

        let result = encoder.encode(
            &channel(),
            provider.as_ref(),
            MessageKind::SecureMessage,
            b"x",
        );
        assert!(matches!(result, Err(ChannelError::ConfigError(_))));
    }

    #[test]
    fn test_frame_length_field_matches_chunk_len() {
        let encoder = ChunkEncoder::new(&limits(8_192, 0));
        let provider = provider_for(SecurityMode::Sign);

        let chunks = encoder
            .encode(&channel(), provider.as_ref(), MessageKind::SecureMessage, b"data")
            .expect("encode");

        for chunk in &chunks {
            let declared = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            assert_eq!(declared as usize, chunk.len());
            assert!(chunk.len() >= FRAME_HEADER_SIZE);
        }
    }
}

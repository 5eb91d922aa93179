//! # Chunk Decoder and Reassembly
//!
//! Consumes complete frames from the stream codec and accumulates secure
//! chunks into one in-flight logical message. The reassembly buffer is
//! exclusively owned here: it is moved out whole when a final chunk lands,
//! and cleared when the sender aborts. Validation happens at arrival time,
//! before a chunk is buffered — a rejected chunk never consumes memory.
//!
//! Reassembly into the message payload (header stripping, unprotection,
//! concatenation) happens later, on the serialization pipeline's worker,
//! via [`reassemble`].

use crate::channel::secure::SecureChannel;
use crate::channel::security::SecurityProvider;
use crate::channel::token::TokenWindow;
use crate::config::ChannelLimits;
use crate::core::chunk::{ChunkKind, Frame, MessageKind, SECURE_PAYLOAD_OFFSET};
use crate::core::messages::ErrorMessage;
use crate::error::{ChannelError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// What the decoder did with one frame.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Frame type this layer does not own; forward unmodified.
    PassThrough(Frame),
    /// Chunk accepted (or abort processed); message not yet complete.
    Buffered,
    /// Final chunk arrived: the complete chunk set, ownership moved out.
    Complete(Vec<Bytes>),
    /// Peer sent a diagnostic error; the connection must close.
    PeerError(ErrorMessage),
}

/// Per-connection chunk decoder with its reassembly buffer.
pub struct ChunkDecoder {
    channel_id: u32,
    max_chunk_size: usize,
    max_chunk_count: usize,
    window: Arc<TokenWindow>,
    chunks: Vec<Bytes>,
}

impl ChunkDecoder {
    /// Build a decoder for one channel. Receive-side bounds apply.
    pub fn new(channel_id: u32, limits: &ChannelLimits, window: Arc<TokenWindow>) -> Self {
        let max_chunk_count = limits.max_chunk_count as usize;
        Self {
            channel_id,
            max_chunk_size: limits.receive_buffer_size as usize,
            max_chunk_count,
            window,
            chunks: Vec::with_capacity(max_chunk_count.min(64)),
        }
    }

    /// Number of chunks currently buffered for the in-flight message.
    pub fn buffered(&self) -> usize {
        self.chunks.len()
    }

    /// Process one complete frame.
    ///
    /// Errors are connection-fatal: the caller must close the connection and
    /// stop feeding the decoder.
    pub fn accept(&mut self, frame: Frame) -> Result<DecodeOutcome> {
        match frame.header.message_kind() {
            Some(MessageKind::SecureMessage) => self.on_secure_message(frame),
            Some(MessageKind::Error) => {
                let error = ErrorMessage::from_frame(&frame)?;
                Ok(DecodeOutcome::PeerError(error))
            }
            _ => Ok(DecodeOutcome::PassThrough(frame)),
        }
    }

    fn on_secure_message(&mut self, frame: Frame) -> Result<DecodeOutcome> {
        let chunk_kind = frame.header.chunk_kind()?;

        if chunk_kind == ChunkKind::Abort {
            debug!(
                discarded = self.chunks.len(),
                "received abort chunk, discarding reassembly buffer"
            );
            self.chunks.clear();
            return Ok(DecodeOutcome::Buffered);
        }

        let buf = &frame.bytes;
        if buf.len() < SECURE_PAYLOAD_OFFSET {
            return Err(ChannelError::DecodingError(format!(
                "secure chunk truncated: {} bytes",
                buf.len()
            )));
        }

        let channel_id = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        if channel_id != self.channel_id {
            return Err(ChannelError::InvalidSecureChannelId { channel_id });
        }

        let token_id = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        if !self.window.is_valid(token_id) {
            return Err(ChannelError::UnknownSecurityToken { token_id });
        }

        if buf.len() > self.max_chunk_size {
            return Err(ChannelError::MessageTooLarge {
                size: buf.len(),
                max: self.max_chunk_size,
            });
        }

        self.chunks.push(frame.bytes);

        if self.max_chunk_count != 0 && self.chunks.len() > self.max_chunk_count {
            return Err(ChannelError::TooManyChunks {
                count: self.chunks.len(),
                max: self.max_chunk_count,
            });
        }

        if chunk_kind == ChunkKind::Final {
            // Hand the buffer off whole; a fresh one takes its place.
            let complete = std::mem::take(&mut self.chunks);
            self.chunks = Vec::with_capacity(self.max_chunk_count.min(64));
            return Ok(DecodeOutcome::Complete(complete));
        }

        Ok(DecodeOutcome::Buffered)
    }
}

/// Strip headers, unprotect, and concatenate a complete chunk set into the
/// message payload. Runs on the pipeline worker, which owns the channel.
///
/// Each chunk is unprotected under the keys of the token id it was stamped
/// with, so messages in flight across a token rotation still decode.
pub fn reassemble(
    channel: &SecureChannel,
    provider: &dyn SecurityProvider,
    chunks: &[Bytes],
) -> Result<Vec<u8>> {
    let mut payload = Vec::new();

    for chunk in chunks {
        if chunk.len() < SECURE_PAYLOAD_OFFSET {
            return Err(ChannelError::DecodingError(format!(
                "secure chunk truncated: {} bytes",
                chunk.len()
            )));
        }

        let token_id = u32::from_le_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]);
        let keys = channel
            .keys_for(token_id)
            .ok_or(ChannelError::UnknownSecurityToken { token_id })?;

        let body = provider.unprotect(keys, &chunk[SECURE_PAYLOAD_OFFSET..])?;
        payload.extend_from_slice(&body);
    }

    Ok(payload)
}

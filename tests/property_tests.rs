//! Property-based tests using proptest
//!
//! These tests validate chunk-codec invariants across a wide range of
//! randomly generated payloads and channel limits.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use opcua_channel::channel::decoder::reassemble;
use opcua_channel::channel::{
    provider_for, ChunkDecoder, ChunkEncoder, DecodeOutcome, SecureChannel, SecurityMode,
    SecurityToken, TokenKeys,
};
use opcua_channel::config::ChannelLimits;
use opcua_channel::core::chunk::{MessageKind, SECURE_PAYLOAD_OFFSET};
use opcua_channel::core::codec::FrameCodec;
use opcua_channel::core::messages::{ErrorMessage, HelloMessage};
use opcua_channel::core::status::StatusCode;
use proptest::prelude::*;
use std::time::Duration;
use tokio_util::codec::Decoder as _;

const CHANNEL_ID: u32 = 3;
const TOKEN_ID: u32 = 12;

fn channel(mode: SecurityMode) -> SecureChannel {
    SecureChannel::new(
        CHANNEL_ID,
        mode,
        SecurityToken::new(TOKEN_ID, Duration::from_secs(600)),
        TokenKeys {
            signing_key: vec![0x33; 32],
            encryption_key: vec![0x44; 32],
        },
    )
}

// Property: decode(encode(message)) == message for any payload and any
// chunk size that forces 1..N chunks.
proptest! {
    #[test]
    fn prop_chunk_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..4096),
        extra_room in 1u32..512,
    ) {
        let mode = SecurityMode::Sign;
        let ch = channel(mode);
        let provider = provider_for(mode);

        let chunk_size = SECURE_PAYLOAD_OFFSET as u32 + provider.overhead() as u32 + extra_room;
        let limits = ChannelLimits {
            receive_buffer_size: chunk_size,
            send_buffer_size: chunk_size,
            max_message_size: 0,
            max_chunk_count: 0,
        };

        let encoder = ChunkEncoder::new(&limits);
        let mut decoder = ChunkDecoder::new(CHANNEL_ID, &limits, ch.token_window());

        let chunks = encoder
            .encode(&ch, provider.as_ref(), MessageKind::SecureMessage, &payload)
            .expect("encode");

        let mut complete = None;
        for raw in &chunks {
            let mut codec = FrameCodec::new();
            let mut buf = BytesMut::from(&raw[..]);
            let frame = codec.decode(&mut buf).expect("frame").expect("complete frame");
            match decoder.accept(frame).expect("accept") {
                DecodeOutcome::Buffered => {}
                DecodeOutcome::Complete(set) => complete = Some(set),
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        let set = complete.expect("message completed");
        let decoded = reassemble(&ch, provider.as_ref(), &set).expect("reassemble");
        prop_assert_eq!(decoded, payload);
    }
}

// Property: the stream codec yields identical frames regardless of how the
// byte stream is fragmented.
proptest! {
    #[test]
    fn prop_framing_is_fragmentation_independent(
        payload in prop::collection::vec(any::<u8>(), 0..512),
        split in 1usize..64,
    ) {
        let ch = channel(SecurityMode::None);
        let provider = provider_for(SecurityMode::None);
        let limits = ChannelLimits::default();
        let encoder = ChunkEncoder::new(&limits);

        let chunks = encoder
            .encode(&ch, provider.as_ref(), MessageKind::SecureMessage, &payload)
            .expect("encode");
        let wire: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();

        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for piece in wire.chunks(split) {
            buf.extend_from_slice(piece);
            while let Some(frame) = codec.decode(&mut buf).expect("decode") {
                frames.push(frame.bytes);
            }
        }

        prop_assert_eq!(frames.len(), chunks.len());
        for (frame, chunk) in frames.iter().zip(&chunks) {
            prop_assert_eq!(frame, chunk);
        }
    }
}

// Property: transport messages survive their binary layouts.
proptest! {
    #[test]
    fn prop_error_message_roundtrip(code in any::<u32>(), reason in ".{0,128}") {
        let message = ErrorMessage::new(StatusCode::new(code), reason);
        let frame = message.to_frame();
        let decoded = ErrorMessage::decode(&frame[8..]).expect("decode");
        prop_assert_eq!(decoded, message);
    }
}

proptest! {
    #[test]
    fn prop_hello_message_roundtrip(
        receive in any::<u32>(),
        send in any::<u32>(),
        max_message in any::<u32>(),
        chunks in any::<u32>(),
        url in "[a-z0-9:/._-]{0,64}",
    ) {
        let message = HelloMessage {
            protocol_version: 0,
            receive_buffer_size: receive,
            send_buffer_size: send,
            max_message_size: max_message,
            max_chunk_count: chunks,
            endpoint_url: url,
        };
        let frame = message.to_frame();
        let decoded = HelloMessage::decode(&frame[8..]).expect("decode");
        prop_assert_eq!(decoded, message);
    }
}

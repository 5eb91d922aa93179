#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Serialization pipeline tests: FIFO ordering under concurrent submission,
//! batch integrity, pause semantics, and token rotation through the worker.

use bytes::Bytes;
use opcua_channel::channel::{ChunkEncoder, SecureChannel, SecurityMode, SecurityToken, TokenKeys};
use opcua_channel::config::ChannelLimits;
use opcua_channel::core::serialization::BincodeCodec;
use opcua_channel::error::ChannelError;
use opcua_channel::pipeline::{PipelineEvent, SerializationPipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const CHANNEL_ID: u32 = 9;
const TOKEN_ID: u32 = 1;

fn keys(fill: u8) -> TokenKeys {
    TokenKeys {
        signing_key: vec![fill; 32],
        encryption_key: vec![fill; 32],
    }
}

fn channel() -> SecureChannel {
    SecureChannel::new(
        CHANNEL_ID,
        SecurityMode::None,
        SecurityToken::new(TOKEN_ID, Duration::from_secs(600)),
        keys(0x01),
    )
}

#[allow(clippy::type_complexity)]
fn spawn_pipeline(
    limits: &ChannelLimits,
) -> (
    SerializationPipeline<Vec<u8>>,
    mpsc::UnboundedReceiver<Vec<Bytes>>,
    mpsc::UnboundedReceiver<Vec<u8>>,
    mpsc::UnboundedReceiver<PipelineEvent>,
) {
    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let pipeline = SerializationPipeline::spawn(
        channel(),
        ChunkEncoder::new(limits),
        Arc::new(BincodeCodec),
        writer_tx,
        delivery_tx,
        events_tx,
    );
    (pipeline, writer_rx, delivery_rx, events_rx)
}

fn payload_of(chunk: &Bytes) -> &[u8] {
    // Header(8) + channel id(4) + token id(4); SecurityMode::None adds nothing.
    &chunk[16..]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_encodes_are_written_in_submission_order() {
    let (pipeline, mut writer_rx, _delivery, _events) = spawn_pipeline(&ChannelLimits::default());

    // Submission order is fixed on the caller side; completion must follow
    // it no matter which worker thread the submitters ran on.
    let mut tasks = JoinSet::new();
    let mut order = Vec::new();
    for i in 0u32..100 {
        let message = i.to_le_bytes().to_vec();
        order.push(message.clone());
        let rx = pipeline.submit_encode(message).expect("submit");
        tasks.spawn(async move { rx.await.expect("done").expect("encode") });
    }
    while let Some(res) = tasks.join_next().await {
        res.expect("join");
    }

    for expected in order {
        let batch = writer_rx.recv().await.expect("batch");
        assert_eq!(batch.len(), 1);
        let message: Vec<u8> = bincode::deserialize(payload_of(&batch[0])).expect("decode");
        assert_eq!(message, expected);
    }
}

#[tokio::test]
async fn multi_chunk_messages_arrive_as_one_uninterrupted_batch() {
    // Small chunks force every message to span several chunks.
    let limits = ChannelLimits {
        receive_buffer_size: 8_192,
        send_buffer_size: 8_192,
        max_message_size: 0,
        max_chunk_count: 0,
    };
    let small = ChannelLimits {
        send_buffer_size: 64,
        ..limits
    };
    let (pipeline, mut writer_rx, _delivery, _events) = spawn_pipeline(&small);

    for i in 0u8..10 {
        pipeline
            .submit_encode(vec![i; 500])
            .expect("submit");
    }

    for i in 0u8..10 {
        let batch = writer_rx.recv().await.expect("batch");
        assert!(batch.len() > 1, "message should span several chunks");

        // All chunks of the batch belong to the same message, intermediate
        // markers first, final marker last.
        for chunk in &batch[..batch.len() - 1] {
            assert_eq!(chunk[3], b'C');
        }
        assert_eq!(batch.last().expect("chunk")[3], b'F');

        let mut payload = Vec::new();
        for chunk in &batch {
            payload.extend_from_slice(payload_of(chunk));
        }
        let message: Vec<u8> = bincode::deserialize(&payload).expect("decode");
        assert_eq!(message, vec![i; 500]);
    }
}

#[tokio::test]
async fn paused_pipeline_fails_callers_with_connection_closed() {
    let (pipeline, _writer_rx, _delivery, _events) = spawn_pipeline(&ChannelLimits::default());

    pipeline.encode(b"before".to_vec()).await.expect("encode");
    pipeline.pause();

    let result = pipeline.encode(b"after".to_vec()).await;
    assert!(matches!(result, Err(ChannelError::ConnectionClosed)));
}

#[tokio::test]
async fn decode_failure_pauses_pipeline_and_fails_queued_jobs() {
    let (pipeline, _writer_rx, mut delivery, mut events) = spawn_pipeline(&ChannelLimits::default());

    // Malformed chunk: too short for a secure header.
    pipeline
        .submit_decode(vec![Bytes::from_static(b"junk")])
        .expect("submit");
    // Queued behind the poisoned job; must never run.
    let queued = pipeline.submit_encode(b"queued".to_vec()).expect("submit");

    let event = events.recv().await.expect("event");
    assert!(matches!(event, PipelineEvent::DecodeFailed(_)));
    assert!(pipeline.is_paused());

    assert!(queued.await.is_err());
    assert!(delivery.recv().await.is_none());
}

#[tokio::test]
async fn token_rotation_runs_in_job_order() {
    let (pipeline, mut writer_rx, _delivery, _events) = spawn_pipeline(&ChannelLimits::default());

    pipeline.encode(b"old".to_vec()).await.expect("encode");
    pipeline
        .renew_token(
            SecurityToken::new(TOKEN_ID + 1, Duration::from_secs(600)),
            keys(0x02),
        )
        .expect("renew");
    pipeline.encode(b"new".to_vec()).await.expect("encode");

    let first = writer_rx.recv().await.expect("batch");
    let second = writer_rx.recv().await.expect("batch");

    let token_of = |chunk: &Bytes| u32::from_le_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]);
    assert_eq!(token_of(&first[0]), TOKEN_ID);
    assert_eq!(token_of(&second[0]), TOKEN_ID + 1);
}

#[tokio::test]
async fn inbound_chunks_under_previous_token_still_decode_after_rotation() {
    let limits = ChannelLimits::default();

    // A second pipeline acts as the sending peer using the original token.
    let (sender, mut sender_writer, _d1, _e1) = spawn_pipeline(&limits);
    sender.encode(b"in flight".to_vec()).await.expect("encode");
    let batch = sender_writer.recv().await.expect("batch");

    // The receiver rotates before the chunks arrive.
    let (receiver, _writer, mut delivery, _e2) = spawn_pipeline(&limits);
    receiver
        .renew_token(
            SecurityToken::new(TOKEN_ID + 1, Duration::from_secs(600)),
            keys(0x02),
        )
        .expect("renew");

    receiver.submit_decode(batch).expect("submit");
    let message = delivery.recv().await.expect("delivered");
    assert_eq!(message, b"in flight");
}

//! # Serialization Pipeline
//!
//! A single logical worker that drains encode/decode jobs strictly one at a
//! time, in submission order, regardless of which task submitted them.
//!
//! The worker owns the [`SecureChannel`] outright — every mutation of crypto
//! and token state happens on this one task, reached only through job
//! submission. No other locking exists around the codec paths because no
//! other code can touch the channel.
//!
//! Two control operations exist: [`SerializationPipeline::pause`] stops the
//! worker at the next job boundary (used after a decode failure, when the
//! channel is presumed corrupted), and dropping every handle shuts the
//! worker down. There is no resume: recovery means tearing the channel down
//! and establishing a new one. Jobs queued past either point fail with a
//! connection-closed error.

use crate::channel::decoder::reassemble;
use crate::channel::encoder::ChunkEncoder;
use crate::channel::secure::{SecureChannel, TokenKeys};
use crate::channel::security::{provider_for, SecurityProvider};
use crate::channel::token::SecurityToken;
use crate::core::chunk::MessageKind;
use crate::core::serialization::MessageCodec;
use crate::core::status::StatusCode;
use crate::error::{ChannelError, Result};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Notifications the worker emits toward the connection driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// An encode job failed; the connection must close.
    EncodeFailed(StatusCode),
    /// A decode job failed; the connection must close and the pipeline has
    /// paused itself.
    DecodeFailed(StatusCode),
}

enum Job<M> {
    Encode {
        message: M,
        done: oneshot::Sender<Result<()>>,
    },
    Decode {
        chunks: Vec<Bytes>,
    },
    RenewToken {
        token: SecurityToken,
        keys: TokenKeys,
    },
}

/// Handle for submitting jobs to one channel's worker. Cheap to clone; all
/// clones feed the same queue.
pub struct SerializationPipeline<M> {
    tx: mpsc::UnboundedSender<Job<M>>,
    paused: Arc<AtomicBool>,
}

impl<M> Clone for SerializationPipeline<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            paused: Arc::clone(&self.paused),
        }
    }
}

impl<M: Send + 'static> SerializationPipeline<M> {
    /// Spawn the worker task for one channel. Must be called within a tokio
    /// runtime.
    ///
    /// - `writer` receives each encoded message's chunks as one batch; the
    ///   transport writes a batch contiguously, so no other message's chunks
    ///   interleave.
    /// - `delivery` receives decoded inbound messages.
    /// - `events` receives failure notifications the driver reacts to.
    pub fn spawn(
        channel: SecureChannel,
        encoder: ChunkEncoder,
        codec: Arc<dyn MessageCodec<M>>,
        writer: mpsc::UnboundedSender<Vec<Bytes>>,
        delivery: mpsc::UnboundedSender<M>,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let paused = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            provider: provider_for(channel.mode()),
            channel,
            encoder,
            codec,
            writer,
            delivery,
            events,
            paused: Arc::clone(&paused),
        };
        tokio::spawn(worker.run(rx));

        Self { tx, paused }
    }

    /// Submit an encode job and wait for it to complete (message serialized,
    /// chunked, and handed to the transport writer).
    pub async fn encode(&self, message: M) -> Result<()> {
        self.submit_encode(message)?
            .await
            .map_err(|_| ChannelError::ConnectionClosed)?
    }

    /// Submit an encode job without waiting. The returned receiver resolves
    /// when the job completes; dropping it detaches from the result.
    pub fn submit_encode(&self, message: M) -> Result<oneshot::Receiver<Result<()>>> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Job::Encode { message, done })
            .map_err(|_| ChannelError::ConnectionClosed)?;
        Ok(rx)
    }

    /// Submit a complete chunk set for decoding. Delivery happens through
    /// the pipeline's delivery channel.
    pub fn submit_decode(&self, chunks: Vec<Bytes>) -> Result<()> {
        self.tx
            .send(Job::Decode { chunks })
            .map_err(|_| ChannelError::ConnectionClosed)
    }

    /// Install a renewed security token. Runs on the worker like any other
    /// job, so rotation is ordered with respect to encodes and decodes.
    pub fn renew_token(&self, token: SecurityToken, keys: TokenKeys) -> Result<()> {
        self.tx
            .send(Job::RenewToken { token, keys })
            .map_err(|_| ChannelError::ConnectionClosed)
    }

    /// Stop dequeuing at the next job boundary. Queued and future jobs fail
    /// with a connection-closed error. There is no resume.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

struct Worker<M> {
    channel: SecureChannel,
    encoder: ChunkEncoder,
    provider: Box<dyn SecurityProvider>,
    codec: Arc<dyn MessageCodec<M>>,
    writer: mpsc::UnboundedSender<Vec<Bytes>>,
    delivery: mpsc::UnboundedSender<M>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    paused: Arc<AtomicBool>,
}

impl<M: Send + 'static> Worker<M> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job<M>>) {
        while let Some(job) = rx.recv().await {
            if self.paused.load(Ordering::Acquire) {
                debug!("pipeline paused, worker halting");
                break;
            }

            match job {
                Job::Encode { message, done } => {
                    let result = self.encode_one(message);
                    let failure = result.as_ref().err().map(ChannelError::status_code);
                    let _ = done.send(result);
                    if let Some(code) = failure {
                        let _ = self.events.send(PipelineEvent::EncodeFailed(code));
                    }
                }
                Job::Decode { chunks } => match self.decode_one(&chunks) {
                    Ok(message) => {
                        let _ = self.delivery.send(message);
                    }
                    Err(e) => {
                        error!(error = %e, "error decoding message, pausing pipeline");
                        self.paused.store(true, Ordering::Release);
                        let _ = self
                            .events
                            .send(PipelineEvent::DecodeFailed(e.status_code()));
                        break;
                    }
                },
                Job::RenewToken { token, keys } => {
                    debug!(token_id = token.token_id, "installing renewed security token");
                    self.channel.renew_token(token, keys);
                }
            }
        }
        // Dropping the receiver fails every queued job's result slot with a
        // connection-closed error on the caller side.
    }

    fn encode_one(&mut self, message: M) -> Result<()> {
        let payload = self.codec.encode(&message)?;
        let chunks = self.encoder.encode(
            &self.channel,
            self.provider.as_ref(),
            MessageKind::SecureMessage,
            &payload,
        )?;
        debug!(
            chunks = chunks.len(),
            bytes = payload.len(),
            "encoded outbound message"
        );
        self.writer
            .send(chunks)
            .map_err(|_| ChannelError::ConnectionClosed)
    }

    fn decode_one(&mut self, chunks: &[Bytes]) -> Result<M> {
        let payload = reassemble(&self.channel, self.provider.as_ref(), chunks)?;
        debug!(
            chunks = chunks.len(),
            bytes = payload.len(),
            "reassembled inbound message"
        );
        self.codec.decode(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::security::SecurityMode;
    use crate::config::ChannelLimits;
    use crate::core::serialization::BincodeCodec;
    use std::time::Duration;

    fn spawn_pipeline() -> (
        SerializationPipeline<String>,
        mpsc::UnboundedReceiver<Vec<Bytes>>,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedReceiver<PipelineEvent>,
    ) {
        let channel = SecureChannel::new(
            1,
            SecurityMode::None,
            SecurityToken::new(1, Duration::from_secs(600)),
            TokenKeys {
                signing_key: vec![0x01; 32],
                encryption_key: vec![0x01; 32],
            },
        );
        let limits = ChannelLimits::default();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let pipeline = SerializationPipeline::spawn(
            channel,
            ChunkEncoder::new(&limits),
            Arc::new(BincodeCodec),
            writer_tx,
            delivery_tx,
            events_tx,
        );
        (pipeline, writer_rx, delivery_rx, events_rx)
    }

    #[tokio::test]
    async fn test_encode_produces_one_batch() {
        let (pipeline, mut writer_rx, _delivery, _events) = spawn_pipeline();

        pipeline.encode("hello".to_string()).await.expect("encode");

        let batch = writer_rx.recv().await.expect("batch");
        assert!(!batch.is_empty());
        assert_eq!(batch.last().expect("chunk")[3], b'F');
    }

    #[tokio::test]
    async fn test_jobs_complete_in_submission_order() {
        let (pipeline, mut writer_rx, _delivery, _events) = spawn_pipeline();

        let mut receivers = Vec::new();
        for i in 0..20 {
            receivers.push(pipeline.submit_encode(format!("message-{i}")).expect("submit"));
        }
        for rx in receivers {
            rx.await.expect("done").expect("encode");
        }

        let codec = BincodeCodec;
        for i in 0..20 {
            let batch = writer_rx.recv().await.expect("batch");
            let payload = &batch[0][16..];
            let message: String = MessageCodec::decode(&codec, payload).expect("decode");
            assert_eq!(message, format!("message-{i}"));
        }
    }

    #[tokio::test]
    async fn test_pause_fails_queued_and_future_jobs() {
        let (pipeline, _writer_rx, _delivery, _events) = spawn_pipeline();

        // Let the worker settle, then pause.
        pipeline.encode("first".to_string()).await.expect("encode");
        pipeline.pause();
        assert!(pipeline.is_paused());

        // The next job wakes the worker, which halts without running it.
        let result = pipeline.encode("second".to_string()).await;
        assert!(matches!(result, Err(ChannelError::ConnectionClosed)));

        // Once the worker is gone, submission itself fails.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pipeline.submit_decode(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_decode_failure_pauses_and_reports() {
        let (pipeline, _writer_rx, mut delivery, mut events) = spawn_pipeline();

        // A chunk too short to carry a secure header is malformed.
        pipeline
            .submit_decode(vec![Bytes::from_static(b"bogus")])
            .expect("submit");

        let event = events.recv().await.expect("event");
        assert!(matches!(event, PipelineEvent::DecodeFailed(_)));
        assert!(pipeline.is_paused());

        // Nothing was delivered.
        assert!(delivery.try_recv().is_err());
    }
}

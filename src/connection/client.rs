//! # Client Connection Driver
//!
//! Glues the transport, chunk codec, serialization pipeline, and connection
//! state machine into one client-side secure-channel connection.
//!
//! ## Task Layout
//! - **read loop**: frames inbound bytes, feeds the chunk decoder, submits
//!   complete chunk sets to the pipeline. Never does crypto or structured
//!   decoding itself, so it never blocks the I/O path.
//! - **write loop**: drains chunk batches from the pipeline and writes each
//!   batch contiguously — one message's chunks are never interleaved with
//!   another's.
//! - **pipeline worker**: owns the channel state; see [`crate::pipeline`].
//! - **event monitor**: closes the connection when the pipeline reports an
//!   encode or decode failure.
//!
//! All state transitions funnel through one critical section per connection,
//! so events arriving concurrently from transport callbacks and user calls
//! are applied atomically, in order.

use crate::channel::decoder::{ChunkDecoder, DecodeOutcome};
use crate::channel::encoder::ChunkEncoder;
use crate::channel::secure::{SecureChannel, TokenKeys};
use crate::channel::token::SecurityToken;
use crate::config::{ChannelLimits, ClientConfig};
use crate::connection::handshake::{transport_handshake, HandshakeSlot};
use crate::connection::state::{transition, Action, ConnectionEvent, ConnectionState};
use crate::core::chunk::Frame;
use crate::core::codec::FrameCodec;
use crate::core::serialization::MessageCodec;
use crate::core::status::StatusCode;
use crate::error::{ChannelError, Result};
use crate::pipeline::{PipelineEvent, SerializationPipeline};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};

/// The inbound streams of one client: decoded messages and frames this
/// layer passes through untouched.
pub struct ClientStreams<M> {
    pub messages: mpsc::UnboundedReceiver<M>,
    pub control_frames: mpsc::UnboundedReceiver<Frame>,
}

/// A client-side secure-channel connection. Cheap to clone and share across
/// tasks; all clones drive the same connection.
pub struct ChannelClient<M> {
    ctx: Arc<ClientContext<M>>,
}

impl<M> Clone for ChannelClient<M> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

struct ClientContext<M> {
    config: ClientConfig,
    codec: Arc<dyn MessageCodec<M>>,
    delivery_tx: mpsc::UnboundedSender<M>,
    control_tx: mpsc::UnboundedSender<Frame>,
    inner: Mutex<ClientInner<M>>,
}

struct ClientInner<M> {
    state: ConnectionState,
    pending: VecDeque<M>,
    handshake: HandshakeSlot,
    pipeline: Option<SerializationPipeline<M>>,
    abort: Option<watch::Sender<bool>>,
    retries_left: u32,
}

impl<M: Send + 'static> ChannelClient<M> {
    /// Build a client. Nothing connects until [`ChannelClient::connect`].
    pub fn new(config: ClientConfig, codec: Arc<dyn MessageCodec<M>>) -> (Self, ClientStreams<M>) {
        let (delivery_tx, messages) = mpsc::unbounded_channel();
        let (control_tx, control_frames) = mpsc::unbounded_channel();

        let ctx = Arc::new(ClientContext {
            config,
            codec,
            delivery_tx,
            control_tx,
            inner: Mutex::new(ClientInner {
                state: ConnectionState::default(),
                pending: VecDeque::new(),
                handshake: HandshakeSlot::new(),
                pipeline: None,
                abort: None,
                retries_left: 0,
            }),
        });

        (
            Self { ctx },
            ClientStreams {
                messages,
                control_frames,
            },
        )
    }

    /// Connect and perform the transport handshake, retrying per the
    /// configured reconnect policy. The factory produces a fresh transport
    /// and the secure-channel state established for it; it is invoked once
    /// per attempt.
    pub async fn connect<S, F, Fut>(&self, mut factory: F) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(S, SecureChannel)>>,
    {
        {
            let inner = self.ctx.lock();
            if inner.state != ConnectionState::Disconnected {
                return Err(ChannelError::InvalidState(
                    "connect requires a disconnected client",
                ));
            }
        }
        self.ctx.handle_event(ConnectionEvent::ConnectRequested);

        loop {
            match attempt(&self.ctx, &mut factory).await {
                Ok(()) => {
                    self.ctx.handle_event(ConnectionEvent::HandshakeSucceeded);
                    return Ok(());
                }
                Err(e) => {
                    let next = self.ctx.handle_event(ConnectionEvent::HandshakeFailed);
                    if next == ConnectionState::Reconnecting {
                        warn!(error = %e, "transport handshake failed, retrying");
                        tokio::time::sleep(self.ctx.config.reconnect.delay).await;
                    } else {
                        error!(error = %e, "transport handshake failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Submit a message. While the handshake is in flight the message is
    /// queued and flushed, in submission order, the moment the connection
    /// becomes usable. On a disconnected or closing channel the caller gets
    /// a connection-closed error instead — no silent drops.
    pub async fn send(&self, message: M) -> Result<()> {
        let pipeline = {
            let mut inner = self.ctx.lock();
            match inner.state {
                ConnectionState::Connected => inner
                    .pipeline
                    .clone()
                    .ok_or(ChannelError::InvalidState("connected without a pipeline"))?,
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    inner.pending.push_back(message);
                    return Ok(());
                }
                ConnectionState::Disconnected | ConnectionState::Closing => {
                    return Err(ChannelError::ConnectionClosed)
                }
            }
        };
        pipeline.encode(message).await
    }

    /// Wait until the handshake settles: `Ok` once the channel is usable,
    /// the failure status otherwise.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.ctx.lock().handshake.watch();
        HandshakeSlot::wait(&mut rx).await
    }

    /// Request an orderly disconnect. The channel transitions through
    /// `Closing` and settles in `Disconnected` once the transport is down.
    pub fn disconnect(&self) {
        self.ctx.handle_event(ConnectionEvent::DisconnectRequested);
    }

    /// Install a renewed security token. Rotation runs on the pipeline
    /// worker, ordered with respect to in-flight encodes and decodes.
    pub fn renew_token(&self, token: SecurityToken, keys: TokenKeys) -> Result<()> {
        let pipeline = self.ctx.lock().pipeline.clone();
        pipeline
            .ok_or(ChannelError::ConnectionClosed)?
            .renew_token(token, keys)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.ctx.lock().state
    }
}

impl<M: Send + 'static> ClientContext<M> {
    fn lock(&self) -> MutexGuard<'_, ClientInner<M>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one event: transition the state machine and execute the
    /// returned actions, all inside the context's critical section.
    fn handle_event(&self, event: ConnectionEvent) -> ConnectionState {
        let mut inner = self.lock();

        let retry = if event == ConnectionEvent::HandshakeFailed {
            let allowed = self.config.reconnect.auto_reconnect && inner.retries_left > 0;
            if allowed {
                inner.retries_left -= 1;
            }
            allowed
        } else {
            false
        };

        let prev = inner.state;
        let (next, actions) = transition(prev, event, retry);
        inner.state = next;
        debug!(prev = ?prev, event = ?event, next = ?next, "connection state transition");

        for action in actions {
            self.apply(&mut inner, *action);
        }
        next
    }

    fn apply(&self, inner: &mut ClientInner<M>, action: Action) {
        match action {
            Action::ArmHandshake => {
                inner.handshake = HandshakeSlot::new();
                inner.retries_left = self.config.reconnect.max_attempts;
            }
            Action::FlushPending => {
                if let Some(pipeline) = &inner.pipeline {
                    let count = inner.pending.len();
                    for message in inner.pending.drain(..) {
                        let _ = pipeline.submit_encode(message);
                    }
                    if count > 0 {
                        debug!(count, "flushed messages queued before handshake");
                    }
                }
            }
            Action::CompleteHandshake => {
                inner.handshake.complete();
            }
            Action::FailHandshake => {
                inner.handshake.fail(StatusCode::BAD_CONNECTION_CLOSED);
            }
            Action::DropPending => {
                if !inner.pending.is_empty() {
                    debug!(count = inner.pending.len(), "dropping queued messages");
                    inner.pending.clear();
                }
            }
            Action::Teardown => {
                if let Some(pipeline) = inner.pipeline.take() {
                    pipeline.pause();
                }
                if let Some(abort) = inner.abort.take() {
                    let _ = abort.send(true);
                }
            }
        }
    }
}

/// One connection attempt: dial, handshake with timeout, start I/O tasks.
async fn attempt<M, S, F, Fut>(ctx: &Arc<ClientContext<M>>, factory: &mut F) -> Result<()>
where
    M: Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(S, SecureChannel)>>,
{
    let (stream, channel) = factory().await?;
    let mut framed = Framed::new(stream, FrameCodec::new());

    let limits = tokio::time::timeout(
        ctx.config.handshake_timeout,
        transport_handshake(&mut framed, &ctx.config),
    )
    .await
    .map_err(|_| ChannelError::Timeout)??;

    start_io(ctx, framed, channel, limits);
    Ok(())
}

/// Wire up pipeline, writer, reader, and event monitor for an established
/// transport.
fn start_io<M, S>(
    ctx: &Arc<ClientContext<M>>,
    framed: Framed<S, FrameCodec>,
    channel: SecureChannel,
    limits: ChannelLimits,
) where
    M: Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let channel_id = channel.channel_id();
    let window = channel.token_window();

    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (abort_tx, abort_rx) = watch::channel(false);

    let pipeline = SerializationPipeline::spawn(
        channel,
        ChunkEncoder::new(&limits),
        Arc::clone(&ctx.codec),
        writer_tx,
        ctx.delivery_tx.clone(),
        events_tx,
    );

    {
        let mut inner = ctx.lock();
        inner.pipeline = Some(pipeline.clone());
        inner.abort = Some(abort_tx);
    }

    let decoder = ChunkDecoder::new(channel_id, &limits, window);
    let (sink, stream) = framed.split();

    tokio::spawn(write_loop(Arc::clone(ctx), sink, writer_rx));
    tokio::spawn(read_loop(Arc::clone(ctx), stream, decoder, pipeline, abort_rx));
    tokio::spawn(monitor_pipeline(Arc::clone(ctx), events_rx));
}

/// Drains chunk batches and writes each batch as one uninterrupted unit.
async fn write_loop<M, S>(
    ctx: Arc<ClientContext<M>>,
    mut sink: SplitSink<Framed<S, FrameCodec>, Bytes>,
    mut rx: mpsc::UnboundedReceiver<Vec<Bytes>>,
) where
    M: Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some(batch) = rx.recv().await {
        for chunk in batch {
            if let Err(e) = sink.feed(chunk).await {
                error!(error = %e, "transport write error");
                ctx.handle_event(ConnectionEvent::ChannelClosed);
                return;
            }
        }
        if let Err(e) = sink.flush().await {
            error!(error = %e, "transport flush error");
            ctx.handle_event(ConnectionEvent::ChannelClosed);
            return;
        }
    }
    let _ = sink.close().await;
}

/// Frames inbound bytes and feeds the chunk decoder. Crypto and structured
/// decoding are off-loaded to the pipeline worker via job submission.
async fn read_loop<M, S>(
    ctx: Arc<ClientContext<M>>,
    mut stream: SplitStream<Framed<S, FrameCodec>>,
    mut decoder: ChunkDecoder,
    pipeline: SerializationPipeline<M>,
    mut abort: watch::Receiver<bool>,
) where
    M: Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            changed = abort.changed() => {
                if changed.is_err() || *abort.borrow() {
                    debug!("read loop stopping on local close");
                    break;
                }
            }
            item = stream.next() => {
                let Some(item) = item else {
                    debug!("transport closed by peer");
                    break;
                };
                match item {
                    Ok(frame) => match decoder.accept(frame) {
                        Ok(DecodeOutcome::Buffered) => {}
                        Ok(DecodeOutcome::PassThrough(frame)) => {
                            let _ = ctx.control_tx.send(frame);
                        }
                        Ok(DecodeOutcome::Complete(chunks)) => {
                            if pipeline.submit_decode(chunks).is_err() {
                                break;
                            }
                        }
                        Ok(DecodeOutcome::PeerError(message)) => {
                            error!(code = %message.error, reason = %message.reason,
                                "received error message");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, status = %e.status_code(),
                                "fatal error processing inbound frame");
                            break;
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "transport read error");
                        break;
                    }
                }
            }
        }
    }
    ctx.handle_event(ConnectionEvent::ChannelClosed);
}

/// Reacts to pipeline failures by closing the connection.
async fn monitor_pipeline<M: Send + 'static>(
    ctx: Arc<ClientContext<M>>,
    mut events: mpsc::UnboundedReceiver<PipelineEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::EncodeFailed(code) => {
                error!(status = %code, "encode job failed, closing connection");
            }
            PipelineEvent::DecodeFailed(code) => {
                error!(status = %code, "decode job failed, closing connection");
            }
        }
        ctx.handle_event(ConnectionEvent::ChannelClosed);
    }
}

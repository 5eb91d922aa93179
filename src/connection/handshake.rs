//! # Transport Handshake
//!
//! The Hello/Acknowledge exchange that precedes secure traffic, and the
//! single-assignment completion slot that represents "channel usable."
//!
//! The slot is first-write-wins: the first success or failure decides the
//! outcome and later completions are no-ops, so racing transport callbacks
//! cannot flip an already-settled handshake.

use crate::config::{ChannelLimits, ClientConfig, MIN_BUFFER_SIZE};
use crate::core::chunk::MessageKind;
use crate::core::codec::FrameCodec;
use crate::core::messages::{AcknowledgeMessage, ErrorMessage, HelloMessage, PROTOCOL_VERSION};
use crate::core::status::StatusCode;
use crate::error::{ChannelError, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tracing::debug;

/// Settled-or-not state of one handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    Succeeded,
    Failed(StatusCode),
}

/// Single-assignment completion slot for "channel usable."
#[derive(Debug)]
pub struct HandshakeSlot {
    tx: watch::Sender<HandshakeState>,
}

impl HandshakeSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HandshakeState::Pending);
        Self { tx }
    }

    /// A receiver any number of waiters can await on.
    pub fn watch(&self) -> watch::Receiver<HandshakeState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> HandshakeState {
        *self.tx.borrow()
    }

    /// Mark the handshake successful. Returns false if already settled.
    pub fn complete(&self) -> bool {
        self.settle(HandshakeState::Succeeded)
    }

    /// Mark the handshake failed. Returns false if already settled.
    pub fn fail(&self, code: StatusCode) -> bool {
        self.settle(HandshakeState::Failed(code))
    }

    fn settle(&self, outcome: HandshakeState) -> bool {
        let mut first = false;
        self.tx.send_if_modified(|state| {
            if *state == HandshakeState::Pending {
                *state = outcome;
                first = true;
                true
            } else {
                false
            }
        });
        first
    }

    /// Wait until the slot settles.
    pub async fn wait(rx: &mut watch::Receiver<HandshakeState>) -> Result<()> {
        loop {
            let state = *rx.borrow();
            match state {
                HandshakeState::Succeeded => return Ok(()),
                HandshakeState::Failed(code) => {
                    return Err(ChannelError::HandshakeFailed { code })
                }
                HandshakeState::Pending => {}
            }
            rx.changed()
                .await
                .map_err(|_| ChannelError::ConnectionClosed)?;
        }
    }
}

impl Default for HandshakeSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Send Hello, await Acknowledge (or Error), and negotiate the effective
/// channel limits.
pub async fn transport_handshake<S>(
    framed: &mut Framed<S, FrameCodec>,
    config: &ClientConfig,
) -> Result<ChannelLimits>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = HelloMessage {
        protocol_version: PROTOCOL_VERSION,
        receive_buffer_size: config.limits.receive_buffer_size,
        send_buffer_size: config.limits.send_buffer_size,
        max_message_size: config.limits.max_message_size,
        max_chunk_count: config.limits.max_chunk_count,
        endpoint_url: config.endpoint_url.clone(),
    };
    framed.send(hello.to_frame()).await?;

    let frame = framed
        .next()
        .await
        .ok_or(ChannelError::ConnectionClosed)??;

    match frame.header.message_kind() {
        Some(MessageKind::Acknowledge) => {
            let ack = AcknowledgeMessage::decode(frame.body())?;
            if ack.protocol_version < PROTOCOL_VERSION {
                return Err(ChannelError::Handshake(format!(
                    "peer protocol version {} below required {}",
                    ack.protocol_version, PROTOCOL_VERSION
                )));
            }
            if ack.receive_buffer_size < MIN_BUFFER_SIZE
                || ack.send_buffer_size < MIN_BUFFER_SIZE
            {
                return Err(ChannelError::Handshake(format!(
                    "peer buffer sizes below protocol minimum ({}/{})",
                    ack.receive_buffer_size, ack.send_buffer_size
                )));
            }

            let limits = config.limits.negotiate(
                ack.receive_buffer_size,
                ack.max_message_size,
                ack.max_chunk_count,
            );
            debug!(
                send_buffer = limits.send_buffer_size,
                receive_buffer = limits.receive_buffer_size,
                max_chunk_count = limits.max_chunk_count,
                "transport handshake complete"
            );
            Ok(limits)
        }
        Some(MessageKind::Error) => {
            let error = ErrorMessage::from_frame(&frame)?;
            Err(ChannelError::RemoteError {
                code: error.error,
                reason: error.reason,
            })
        }
        _ => Err(ChannelError::Handshake(format!(
            "unexpected message type {:?} during handshake",
            frame.header.tag
        ))),
    }
}

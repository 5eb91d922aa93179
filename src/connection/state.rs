//! # Connection State Machine
//!
//! The client connection lifecycle as a closed set of states and a total
//! transition function: every `(state, event)` pair yields a defined next
//! state (possibly itself) plus the side effects the driver must execute.
//!
//! Keeping the transition pure and exhaustively matched makes the whole
//! table verifiable at compile time; the driver applies the returned actions
//! inside its critical section, so concurrent events are serialized and
//! atomic.

/// Lifecycle states of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport; nothing in flight.
    #[default]
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Handshake complete; messages flow.
    Connected,
    /// A failed attempt is being retried per the reconnect policy.
    Reconnecting,
    /// Local disconnect requested; waiting for the channel to close.
    Closing,
}

/// Events that drive the state machine, from user API calls and transport
/// callbacks alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested,
    HandshakeSucceeded,
    HandshakeFailed,
    ChannelClosed,
    DisconnectRequested,
}

/// Side effects the driver executes after a transition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Arm a fresh handshake completion slot for the new attempt.
    ArmHandshake,
    /// Flush messages queued before the handshake, in submission order,
    /// ahead of anything submitted afterwards.
    FlushPending,
    /// Complete the handshake slot: the channel is usable.
    CompleteHandshake,
    /// Fail a still-pending handshake slot with a connection-closed error.
    FailHandshake,
    /// Drop queued messages; their senders see a closed connection.
    DropPending,
    /// Pause and release the pipeline and stop the I/O tasks.
    Teardown,
}

use Action::*;
use ConnectionEvent::*;
use ConnectionState::*;

/// The transition function. `retry` reports whether the reconnect policy
/// permits another attempt; it is only consulted for `HandshakeFailed`.
pub fn transition(
    state: ConnectionState,
    event: ConnectionEvent,
    retry: bool,
) -> (ConnectionState, &'static [Action]) {
    match (state, event) {
        (Disconnected, ConnectRequested) => (Connecting, &[ArmHandshake]),
        (Disconnected, HandshakeSucceeded) => (Disconnected, &[]),
        (Disconnected, HandshakeFailed) => (Disconnected, &[]),
        (Disconnected, ChannelClosed) => (Disconnected, &[]),
        (Disconnected, DisconnectRequested) => (Disconnected, &[]),

        (Connecting, ConnectRequested) => (Connecting, &[]),
        (Connecting, HandshakeSucceeded) => (Connected, &[FlushPending, CompleteHandshake]),
        (Connecting, HandshakeFailed) if retry => (Reconnecting, &[]),
        (Connecting, HandshakeFailed) => (Disconnected, &[FailHandshake, DropPending]),
        (Connecting, ChannelClosed) => (Disconnected, &[FailHandshake, DropPending, Teardown]),
        (Connecting, DisconnectRequested) => {
            (Disconnected, &[FailHandshake, DropPending, Teardown])
        }

        (Connected, ConnectRequested) => (Connected, &[]),
        (Connected, HandshakeSucceeded) => (Connected, &[]),
        (Connected, HandshakeFailed) => (Connected, &[]),
        (Connected, ChannelClosed) => (Disconnected, &[FailHandshake, DropPending, Teardown]),
        (Connected, DisconnectRequested) => (Closing, &[Teardown]),

        (Reconnecting, ConnectRequested) => (Reconnecting, &[]),
        (Reconnecting, HandshakeSucceeded) => (Connected, &[FlushPending, CompleteHandshake]),
        (Reconnecting, HandshakeFailed) if retry => (Reconnecting, &[]),
        (Reconnecting, HandshakeFailed) => (Disconnected, &[FailHandshake, DropPending]),
        (Reconnecting, ChannelClosed) => {
            (Disconnected, &[FailHandshake, DropPending, Teardown])
        }
        (Reconnecting, DisconnectRequested) => {
            (Disconnected, &[FailHandshake, DropPending, Teardown])
        }

        (Closing, ConnectRequested) => (Closing, &[]),
        (Closing, HandshakeSucceeded) => (Closing, &[]),
        (Closing, HandshakeFailed) => (Closing, &[]),
        (Closing, ChannelClosed) => (Disconnected, &[DropPending]),
        (Closing, DisconnectRequested) => (Closing, &[]),
    }
}

//! # Connection Lifecycle
//!
//! The client connection: state machine, transport handshake, and the
//! driver that ties them to the codec and pipeline.

pub mod client;
pub mod handshake;
pub mod state;

pub use client::{ChannelClient, ClientStreams};
pub use handshake::{HandshakeSlot, HandshakeState};
pub use state::{transition, Action, ConnectionEvent, ConnectionState};

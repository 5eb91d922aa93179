//! # opcua-channel
//!
//! Secure-channel transport core for OPC UA client/server communication.
//!
//! This crate implements the transport/session layer that carries
//! application messages over TCP inside a cryptographically protected
//! secure channel: chunked framing with reassembly, token-based key
//! rotation, a single-worker serialization pipeline guarding the channel's
//! crypto state, and the connection lifecycle state machine.
//!
//! ## Architecture
//! - [`core`]: wire format — frame header, stream framing codec,
//!   Hello/Acknowledge/Error messages, status codes
//! - [`channel`]: secure-channel state, token rotation, and the chunk
//!   encoder/decoder with the security-provider seam
//! - [`pipeline`]: the single-worker job queue serializing all
//!   encode/decode access to one channel's crypto state
//! - [`connection`]: the client driver and its lifecycle state machine
//!
//! ## Guarantees
//! - Per-chunk validation (channel id, token id, size) before buffering;
//!   chunk-count and chunk-size bounds cap memory per in-flight message
//! - Encode jobs complete strictly in submission order; one message's
//!   chunks are never interleaved with another's on the wire
//! - No partial message is ever delivered: decode failures close the
//!   connection and pause the pipeline
//! - Callers awaiting a closed channel get a connection-closed error, never
//!   a silent drop
//!
//! ## Example
//! ```no_run
//! use opcua_channel::channel::{SecureChannel, SecurityMode, SecurityToken, TokenKeys};
//! use opcua_channel::config::ClientConfig;
//! use opcua_channel::connection::ChannelClient;
//! use opcua_channel::core::serialization::BincodeCodec;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> opcua_channel::error::Result<()> {
//! let (client, mut streams) =
//!     ChannelClient::<String>::new(ClientConfig::default(), Arc::new(BincodeCodec));
//!
//! client
//!     .connect(|| async {
//!         let stream = tokio::net::TcpStream::connect("127.0.0.1:4840").await?;
//!         // Channel id, token, and keys come from the channel-establishment
//!         // exchange, which is outside this crate.
//!         let channel = SecureChannel::new(
//!             1,
//!             SecurityMode::None,
//!             SecurityToken::new(1, Duration::from_secs(3600)),
//!             TokenKeys { signing_key: vec![0; 32], encryption_key: vec![0; 32] },
//!         );
//!         Ok((stream, channel))
//!     })
//!     .await?;
//!
//! client.send("hello".to_string()).await?;
//! if let Some(reply) = streams.messages.recv().await {
//!     println!("got: {reply}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod pipeline;

pub use channel::{SecureChannel, SecurityMode, SecurityToken, TokenKeys};
pub use config::{ChannelLimits, ClientConfig};
pub use connection::{ChannelClient, ConnectionEvent, ConnectionState};
pub use error::{ChannelError, Result};
pub use pipeline::SerializationPipeline;

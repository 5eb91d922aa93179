//! # Message Serialization
//!
//! The seam between the transport and the structured message types it
//! carries. The transport never interprets message fields; it hands a
//! message to a [`MessageCodec`] to obtain the contiguous payload the chunk
//! encoder splits, and back again after reassembly.
//!
//! The shipped [`BincodeCodec`] serializes any serde type with bincode.
//! Stacks with generated structured types plug in their own codec keyed by
//! type identifiers.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes and decodes one message type for transport.
pub trait MessageCodec<M>: Send + Sync {
    /// Serialize a message body into one contiguous buffer.
    fn encode(&self, message: &M) -> Result<Vec<u8>>;

    /// Decode a message body from a reassembled payload.
    fn decode(&self, payload: &[u8]) -> Result<M>;
}

/// Binary codec over serde for arbitrary message types.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<M> MessageCodec<M> for BincodeCodec
where
    M: Serialize + DeserializeOwned,
{
    fn encode(&self, message: &M) -> Result<Vec<u8>> {
        Ok(bincode::serialize(message)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<M> {
        Ok(bincode::deserialize(payload)?)
    }
}

//! # Error Types
//!
//! Error handling for the secure-channel transport.
//!
//! This module defines all error variants the transport can produce, from
//! low-level I/O failures to security-validation rejections, and maps each
//! variant onto the numeric status code peers expect on the wire.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and stream failures
//! - **Framing Errors**: bad lengths, unknown message types — connection-fatal
//! - **Security Errors**: channel-id/token mismatches, size and chunk-count
//!   bound violations — connection-fatal, never retried at this layer
//! - **Codec Errors**: malformed payloads after reassembly — connection-fatal
//!   and pause the serialization pipeline
//! - **Peer Errors**: error messages received from the remote endpoint

use crate::core::status::StatusCode;
use std::io;
use thiserror::Error;

/// Primary error type for all secure-channel operations.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("invalid message type: {0:?}")]
    InvalidMessageType([u8; 3]),

    #[error("invalid chunk kind: {0:#04x}")]
    InvalidChunkKind(u8),

    #[error("frame length {length} out of range (max {max})")]
    BadFrameLength { length: usize, max: usize },

    #[error("invalid secure channel id: {channel_id}")]
    InvalidSecureChannelId { channel_id: u32 },

    #[error("unknown secure channel token: {token_id}")]
    UnknownSecurityToken { token_id: u32 },

    #[error("max chunk size exceeded ({size} > {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("max chunk count exceeded ({count} > {max})")]
    TooManyChunks { count: usize, max: usize },

    #[error("malformed message: {0}")]
    DecodingError(String),

    #[error("security error: {0}")]
    SecurityError(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("handshake failed: {code}")]
    HandshakeFailed { code: StatusCode },

    #[error("peer sent error: {code}: {reason}")]
    RemoteError { code: StatusCode, reason: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("operation timed out")]
    Timeout,

    #[error("invalid state for operation: {0}")]
    InvalidState(&'static str),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl ChannelError {
    /// The numeric status code this error maps to on the wire.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChannelError::Io(_) => StatusCode::BAD_COMMUNICATION_ERROR,
            ChannelError::Serialization(_) => StatusCode::BAD_ENCODING_ERROR,
            ChannelError::InvalidMessageType(_) => StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
            ChannelError::InvalidChunkKind(_) => StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
            ChannelError::BadFrameLength { .. } => StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
            ChannelError::InvalidSecureChannelId { .. } => {
                StatusCode::BAD_SECURE_CHANNEL_ID_INVALID
            }
            ChannelError::UnknownSecurityToken { .. } => {
                StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN
            }
            ChannelError::MessageTooLarge { .. } => StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
            ChannelError::TooManyChunks { .. } => StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
            ChannelError::DecodingError(_) => StatusCode::BAD_DECODING_ERROR,
            ChannelError::SecurityError(_) => StatusCode::BAD_SECURITY_CHECKS_FAILED,
            ChannelError::Handshake(_) => StatusCode::BAD_TCP_INTERNAL_ERROR,
            ChannelError::HandshakeFailed { code } => *code,
            ChannelError::RemoteError { code, .. } => *code,
            ChannelError::ConnectionClosed => StatusCode::BAD_CONNECTION_CLOSED,
            ChannelError::Timeout => StatusCode::BAD_TIMEOUT,
            ChannelError::InvalidState(_) => StatusCode::BAD_INVALID_STATE,
            ChannelError::ConfigError(_) => StatusCode::BAD_UNEXPECTED_ERROR,
        }
    }
}

/// Type alias for Results using `ChannelError`.
pub type Result<T> = std::result::Result<T, ChannelError>;

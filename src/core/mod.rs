//! # Core Wire Format
//!
//! Low-level frame handling: message tags, chunk markers, stream framing,
//! transport messages, and status codes.
//!
//! ## Components
//! - **Chunk**: frame header layout, message-type tags, chunk-kind markers
//! - **Codec**: tokio codec for length-delimited framing over byte streams
//! - **Messages**: Hello/Acknowledge/Error transport messages
//! - **Status**: numeric protocol status codes
//!
//! ## Wire Format
//! ```text
//! [Type(3)] [ChunkKind(1)] [Length(4, LE)] [Body(N)]
//! ```
//!
//! ## Security
//! - Length validation before allocation (16MB absolute cap)
//! - Channel limits enforced per chunk in the chunk decoder

pub mod chunk;
pub mod codec;
pub mod messages;
pub mod serialization;
pub mod status;

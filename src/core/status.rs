//! # Status Codes
//!
//! Numeric OPC UA status codes carried on the wire in error messages and
//! mapped from local validation failures.
//!
//! The values are the ones defined by the protocol; peers match on them, so
//! they must not be invented locally. Only the codes this transport layer
//! can produce or receive are listed.

use std::fmt;

/// A 32-bit OPC UA status code.
///
/// The top two bits carry severity: `00` good, `01` uncertain, `10` bad.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u32);

impl StatusCode {
    /// The operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);

    /// An unexpected error occurred.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);

    /// A low level communication error occurred.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);

    /// Encoding halted because of invalid data in the objects being serialized.
    pub const BAD_ENCODING_ERROR: StatusCode = StatusCode(0x8006_0000);

    /// Decoding halted because of invalid data in the stream.
    pub const BAD_DECODING_ERROR: StatusCode = StatusCode(0x8007_0000);

    /// The operation timed out.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);

    /// An error occurred verifying security.
    pub const BAD_SECURITY_CHECKS_FAILED: StatusCode = StatusCode(0x8013_0000);

    /// The specified secure channel is no longer valid.
    pub const BAD_SECURE_CHANNEL_ID_INVALID: StatusCode = StatusCode(0x8022_0000);

    /// The type of the message specified in the header is invalid.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: StatusCode = StatusCode(0x807E_0000);

    /// The size of the message specified in the header is too large.
    pub const BAD_TCP_MESSAGE_TOO_LARGE: StatusCode = StatusCode(0x8080_0000);

    /// An internal error occurred.
    pub const BAD_TCP_INTERNAL_ERROR: StatusCode = StatusCode(0x8082_0000);

    /// The server does not recognize the endpoint URL specified.
    pub const BAD_TCP_ENDPOINT_URL_INVALID: StatusCode = StatusCode(0x8083_0000);

    /// The secure channel has been closed.
    pub const BAD_SECURE_CHANNEL_CLOSED: StatusCode = StatusCode(0x8086_0000);

    /// The token has expired or is not recognized.
    pub const BAD_SECURE_CHANNEL_TOKEN_UNKNOWN: StatusCode = StatusCode(0x8087_0000);

    /// The network connection has been closed.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);

    /// The operation cannot be completed because the object is closed,
    /// uninitialized or in some other invalid state.
    pub const BAD_INVALID_STATE: StatusCode = StatusCode(0x80AF_0000);

    /// Construct a status code from its raw wire value.
    pub const fn new(value: u32) -> Self {
        StatusCode(value)
    }

    /// The raw 32-bit wire value.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Severity bits indicate success.
    pub const fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Severity bits indicate failure.
    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Symbolic name for known codes, `"Unknown"` otherwise.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::GOOD => "Good",
            StatusCode::BAD_UNEXPECTED_ERROR => "Bad_UnexpectedError",
            StatusCode::BAD_COMMUNICATION_ERROR => "Bad_CommunicationError",
            StatusCode::BAD_ENCODING_ERROR => "Bad_EncodingError",
            StatusCode::BAD_DECODING_ERROR => "Bad_DecodingError",
            StatusCode::BAD_TIMEOUT => "Bad_Timeout",
            StatusCode::BAD_SECURITY_CHECKS_FAILED => "Bad_SecurityChecksFailed",
            StatusCode::BAD_SECURE_CHANNEL_ID_INVALID => "Bad_SecureChannelIdInvalid",
            StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID => "Bad_TcpMessageTypeInvalid",
            StatusCode::BAD_TCP_MESSAGE_TOO_LARGE => "Bad_TcpMessageTooLarge",
            StatusCode::BAD_TCP_INTERNAL_ERROR => "Bad_TcpInternalError",
            StatusCode::BAD_TCP_ENDPOINT_URL_INVALID => "Bad_TcpEndpointUrlInvalid",
            StatusCode::BAD_SECURE_CHANNEL_CLOSED => "Bad_SecureChannelClosed",
            StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN => "Bad_SecureChannelTokenUnknown",
            StatusCode::BAD_CONNECTION_CLOSED => "Bad_ConnectionClosed",
            StatusCode::BAD_INVALID_STATE => "Bad_InvalidState",
            _ => "Unknown",
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode({:#010X}, {})", self.0, self.name())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010X})", self.name(), self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        StatusCode(value)
    }
}

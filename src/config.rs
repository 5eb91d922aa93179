//! # Configuration Management
//!
//! Centralized configuration for the secure-channel transport.
//!
//! This module provides structured configuration for channel limits and
//! client connection behavior, including reconnect policy and timeouts.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-variable overrides via `from_env()`
//!
//! ## Security Considerations
//! - Chunk size and count limits cap memory per in-flight message
//! - Limits below the protocol minimum (8192-byte buffers) are rejected

use crate::error::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Protocol minimum for send/receive buffer sizes.
pub const MIN_BUFFER_SIZE: u32 = 8_192;

/// Default send/receive buffer size (also the per-chunk size bound).
pub const DEFAULT_BUFFER_SIZE: u32 = 65_535;

/// Default maximum size of a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Default maximum number of chunks in one message.
pub const DEFAULT_MAX_CHUNK_COUNT: u32 = 256;

/// Resource bounds for one secure channel. A value of zero means
/// "no limit" for `max_message_size` and `max_chunk_count`, matching the
/// wire protocol's convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelLimits {
    /// Largest chunk this side is willing to receive; also the size of the
    /// receive buffer.
    pub receive_buffer_size: u32,

    /// Largest chunk this side will send.
    pub send_buffer_size: u32,

    /// Largest reassembled message this side will accept.
    pub max_message_size: u32,

    /// Most chunks one message may span.
    pub max_chunk_count: u32,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_BUFFER_SIZE,
            send_buffer_size: DEFAULT_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_chunk_count: DEFAULT_MAX_CHUNK_COUNT,
        }
    }
}

impl ChannelLimits {
    /// Validate the limits.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.receive_buffer_size < MIN_BUFFER_SIZE {
            errors.push(format!(
                "Receive buffer size too small: {} (minimum: {})",
                self.receive_buffer_size, MIN_BUFFER_SIZE
            ));
        }

        if self.send_buffer_size < MIN_BUFFER_SIZE {
            errors.push(format!(
                "Send buffer size too small: {} (minimum: {})",
                self.send_buffer_size, MIN_BUFFER_SIZE
            ));
        }

        if self.max_message_size != 0 && self.max_message_size < self.receive_buffer_size {
            errors.push(format!(
                "Max message size {} smaller than receive buffer size {}",
                self.max_message_size, self.receive_buffer_size
            ));
        }

        errors
    }

    /// Combine local limits with the limits a peer acknowledged: each bound
    /// is the stricter of the two, with zero treated as unbounded.
    pub fn negotiate(
        &self,
        peer_receive_buffer: u32,
        peer_max_message_size: u32,
        peer_max_chunk_count: u32,
    ) -> ChannelLimits {
        fn min_nonzero(a: u32, b: u32) -> u32 {
            match (a, b) {
                (0, b) => b,
                (a, 0) => a,
                (a, b) => a.min(b),
            }
        }

        ChannelLimits {
            receive_buffer_size: self.receive_buffer_size,
            // Outbound chunks must fit the peer's receive buffer.
            send_buffer_size: self.send_buffer_size.min(peer_receive_buffer),
            max_message_size: min_nonzero(self.max_message_size, peer_max_message_size),
            max_chunk_count: min_nonzero(self.max_chunk_count, peer_max_chunk_count),
        }
    }
}

/// Reconnect behavior after a failed handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectPolicy {
    /// Whether to retry a failed connection attempt at all.
    pub auto_reconnect: bool,

    /// Maximum number of retry attempts before giving up.
    pub max_attempts: u32,

    /// Delay between attempts.
    #[serde(with = "duration_serde")]
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Client-side configuration for one secure-channel connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Endpoint URL announced in the Hello message.
    pub endpoint_url: String,

    /// Timeout for the transport handshake.
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Channel resource limits proposed to the peer.
    #[serde(default)]
    pub limits: ChannelLimits,

    /// Reconnect policy applied on handshake failure.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::from("opc.tcp://localhost:4840"),
            handshake_timeout: Duration::from_secs(5),
            limits: ChannelLimits::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChannelError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ChannelError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables, starting from defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("OPCUA_CHANNEL_ENDPOINT_URL") {
            config.endpoint_url = url;
        }

        if let Ok(size) = std::env::var("OPCUA_CHANNEL_RECEIVE_BUFFER_SIZE") {
            if let Ok(val) = size.parse::<u32>() {
                config.limits.receive_buffer_size = val;
            }
        }

        if let Ok(count) = std::env::var("OPCUA_CHANNEL_MAX_CHUNK_COUNT") {
            if let Ok(val) = count.parse::<u32>() {
                config.limits.max_chunk_count = val;
            }
        }

        if let Ok(timeout) = std::env::var("OPCUA_CHANNEL_HANDSHAKE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.handshake_timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.endpoint_url.is_empty() {
            errors.push("Endpoint URL cannot be empty".to_string());
        } else if !self.endpoint_url.starts_with("opc.tcp://") {
            errors.push(format!(
                "Invalid endpoint URL scheme: '{}' (expected 'opc.tcp://...')",
                self.endpoint_url
            ));
        }

        errors.extend(self.limits.validate());

        if self.reconnect.auto_reconnect && self.reconnect.max_attempts == 0 {
            errors.push(
                "Max reconnect attempts must be greater than 0 when auto_reconnect is enabled"
                    .to_string(),
            );
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }

    /// Validate and return Result - convenience method.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Helper module for Duration serialization/deserialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_empty());
    }

    #[test]
    fn test_undersized_buffers_rejected() {
        let config = ClientConfig::default_with_overrides(|c| {
            c.limits.receive_buffer_size = 1024;
        });
        assert!(!config.validate().is_empty());
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn test_bad_endpoint_scheme_rejected() {
        let config = ClientConfig::default_with_overrides(|c| {
            c.endpoint_url = "http://localhost".into();
        });
        assert!(!config.validate().is_empty());
    }

    #[test]
    fn test_negotiate_takes_stricter_bound() {
        let local = ChannelLimits::default();
        let negotiated = local.negotiate(8_192, 1024 * 1024, 16);

        assert_eq!(negotiated.send_buffer_size, 8_192);
        assert_eq!(negotiated.max_message_size, 1024 * 1024);
        assert_eq!(negotiated.max_chunk_count, 16);
        // Our receive side is unaffected by the peer's receive buffer.
        assert_eq!(negotiated.receive_buffer_size, local.receive_buffer_size);
    }

    #[test]
    fn test_negotiate_zero_means_unbounded() {
        let local = ChannelLimits {
            max_message_size: 0,
            ..ChannelLimits::default()
        };
        let negotiated = local.negotiate(DEFAULT_BUFFER_SIZE, 0, 0);

        assert_eq!(negotiated.max_message_size, 0);
        assert_eq!(negotiated.max_chunk_count, local.max_chunk_count);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ClientConfig::default();
        let toml = toml::to_string(&config).expect("serialize");
        let parsed = ClientConfig::from_toml(&toml).expect("parse");
        assert_eq!(parsed.endpoint_url, config.endpoint_url);
        assert_eq!(parsed.limits, config.limits);
    }
}

//! # Secure Channel State
//!
//! Identity, token rotation, and key material for one secure channel.
//!
//! A `SecureChannel` is produced by the channel-establishment exchange
//! (outside this crate's scope) and then owned exclusively by the
//! serialization pipeline's worker — every mutation happens on that worker,
//! which is what makes the codec paths safe without further locking. The
//! decode path gets a shared read-only [`TokenWindow`] for validating token
//! ids at chunk-arrival time.

use crate::channel::security::SecurityMode;
use crate::channel::token::{SecurityToken, TokenWindow};
use std::sync::Arc;
use zeroize::Zeroize;

/// Symmetric key material derived for one security token. Opaque to the
/// transport; only the security provider interprets it.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct TokenKeys {
    pub signing_key: Vec<u8>,
    pub encryption_key: Vec<u8>,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never appears in logs.
        f.debug_struct("TokenKeys").finish_non_exhaustive()
    }
}

/// State of one secure channel: stable id, negotiated security mode, and the
/// current/previous token pair with their keys.
pub struct SecureChannel {
    channel_id: u32,
    mode: SecurityMode,
    current_token: SecurityToken,
    current_keys: TokenKeys,
    previous_token: Option<SecurityToken>,
    previous_keys: Option<TokenKeys>,
    window: Arc<TokenWindow>,
}

impl SecureChannel {
    pub fn new(
        channel_id: u32,
        mode: SecurityMode,
        token: SecurityToken,
        keys: TokenKeys,
    ) -> Self {
        let window = Arc::new(TokenWindow::new(token.token_id));
        Self {
            channel_id,
            mode,
            current_token: token,
            current_keys: keys,
            previous_token: None,
            previous_keys: None,
            window,
        }
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn current_token(&self) -> &SecurityToken {
        &self.current_token
    }

    pub fn previous_token(&self) -> Option<&SecurityToken> {
        self.previous_token.as_ref()
    }

    /// Keys for outbound chunks; always the current token's keys.
    pub fn current_keys(&self) -> &TokenKeys {
        &self.current_keys
    }

    /// The shared token-validity view handed to the decode path.
    pub fn token_window(&self) -> Arc<TokenWindow> {
        Arc::clone(&self.window)
    }

    /// Install a renewed token. The old token shifts into the previous slot
    /// and remains valid for inbound chunks until the next renewal.
    pub fn renew_token(&mut self, token: SecurityToken, keys: TokenKeys) {
        self.window.rotate(token.token_id);
        self.previous_token = Some(std::mem::replace(&mut self.current_token, token));
        self.previous_keys = Some(std::mem::replace(&mut self.current_keys, keys));
    }

    /// Keys for an inbound chunk stamped with `token_id`, if that id is the
    /// current or previous token.
    pub fn keys_for(&self, token_id: u32) -> Option<&TokenKeys> {
        if token_id == self.current_token.token_id {
            Some(&self.current_keys)
        } else if self.previous_token.map(|t| t.token_id) == Some(token_id) {
            self.previous_keys.as_ref()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("channel_id", &self.channel_id)
            .field("mode", &self.mode)
            .field("current_token", &self.current_token.token_id)
            .field(
                "previous_token",
                &self.previous_token.map(|t| t.token_id),
            )
            .finish()
    }
}

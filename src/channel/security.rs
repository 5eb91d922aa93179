//! # Security Provider
//!
//! The seam between the chunk codec and cryptography. The codec hands each
//! chunk body to a [`SecurityProvider`] for protection (sign/encrypt) on the
//! way out and unprotection (verify/decrypt) on the way in; the provider's
//! internals are opaque to the rest of the transport.
//!
//! Two providers ship with the crate:
//! - [`NullSecurity`] for `SecurityMode::None`: the identity transform
//! - [`SymmetricSecurity`]: keyed SHA-256 signatures, with XChaCha20-Poly1305
//!   encryption added in `SignAndEncrypt` mode

use crate::channel::secure::TokenKeys;
use crate::error::{ChannelError, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Size of the signature appended by [`SymmetricSecurity`].
const SIGNATURE_SIZE: usize = 32;

/// Nonce prepended to each encrypted body.
const NONCE_SIZE: usize = 24;

/// AEAD authentication tag appended by the cipher.
const TAG_SIZE: usize = 16;

/// How message bodies are protected on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SecurityMode {
    /// No signing or encryption.
    #[default]
    None,
    /// Bodies are signed but sent in the clear.
    Sign,
    /// Bodies are signed and encrypted.
    SignAndEncrypt,
}

/// Protects and unprotects chunk bodies under a token's key material.
pub trait SecurityProvider: Send + Sync {
    /// Worst-case bytes added to a body by `protect`. The chunk encoder
    /// budgets chunk payload sizes with this.
    fn overhead(&self) -> usize;

    /// Apply the channel's security to one outbound chunk body.
    fn protect(&self, keys: &TokenKeys, body: &[u8]) -> Result<Vec<u8>>;

    /// Verify and strip the security envelope from one inbound chunk body.
    fn unprotect(&self, keys: &TokenKeys, body: &[u8]) -> Result<Vec<u8>>;
}

/// Build the provider for a security mode.
pub fn provider_for(mode: SecurityMode) -> Box<dyn SecurityProvider> {
    match mode {
        SecurityMode::None => Box::new(NullSecurity),
        SecurityMode::Sign => Box::new(SymmetricSecurity { encrypt: false }),
        SecurityMode::SignAndEncrypt => Box::new(SymmetricSecurity { encrypt: true }),
    }
}

/// Identity provider for unsecured channels.
pub struct NullSecurity;

impl SecurityProvider for NullSecurity {
    fn overhead(&self) -> usize {
        0
    }

    fn protect(&self, _keys: &TokenKeys, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }

    fn unprotect(&self, _keys: &TokenKeys, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }
}

/// Symmetric provider: keyed SHA-256 signature over the body, optionally
/// wrapped in XChaCha20-Poly1305 with a random nonce prefix.
pub struct SymmetricSecurity {
    encrypt: bool,
}

impl SymmetricSecurity {
    fn sign(keys: &TokenKeys, body: &[u8]) -> [u8; SIGNATURE_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(&keys.signing_key);
        hasher.update(body);
        hasher.finalize().into()
    }

    fn cipher(keys: &TokenKeys) -> Result<XChaCha20Poly1305> {
        XChaCha20Poly1305::new_from_slice(&keys.encryption_key)
            .map_err(|_| ChannelError::SecurityError("invalid encryption key length".into()))
    }
}

impl SecurityProvider for SymmetricSecurity {
    fn overhead(&self) -> usize {
        if self.encrypt {
            SIGNATURE_SIZE + NONCE_SIZE + TAG_SIZE
        } else {
            SIGNATURE_SIZE
        }
    }

    fn protect(&self, keys: &TokenKeys, body: &[u8]) -> Result<Vec<u8>> {
        let mut signed = Vec::with_capacity(body.len() + SIGNATURE_SIZE);
        signed.extend_from_slice(body);
        signed.extend_from_slice(&Self::sign(keys, body));

        if !self.encrypt {
            return Ok(signed);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = Self::cipher(keys)?
            .encrypt(XNonce::from_slice(&nonce), signed.as_slice())
            .map_err(|_| ChannelError::SecurityError("encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn unprotect(&self, keys: &TokenKeys, body: &[u8]) -> Result<Vec<u8>> {
        let signed = if self.encrypt {
            if body.len() < NONCE_SIZE + TAG_SIZE {
                return Err(ChannelError::SecurityError(
                    "encrypted body too short".into(),
                ));
            }
            let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
            Self::cipher(keys)?
                .decrypt(XNonce::from_slice(nonce), ciphertext)
                .map_err(|_| ChannelError::SecurityError("decryption failed".into()))?
        } else {
            body.to_vec()
        };

        if signed.len() < SIGNATURE_SIZE {
            return Err(ChannelError::SecurityError("signed body too short".into()));
        }

        let (payload, signature) = signed.split_at(signed.len() - SIGNATURE_SIZE);
        if signature != Self::sign(keys, payload) {
            return Err(ChannelError::SecurityError(
                "signature verification failed".into(),
            ));
        }

        Ok(payload.to_vec())
    }
}

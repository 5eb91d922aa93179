//! # Security Tokens
//!
//! A security token authorizes signing and encryption on a secure channel
//! for a bounded window of time. Tokens rotate: when a new token is issued
//! the old one stays valid for a grace period, so in-flight chunks stamped
//! with the previous token id still verify.

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// A channel security token: id plus validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityToken {
    pub token_id: u32,
    pub created_at: Instant,
    pub lifetime: Duration,
}

impl SecurityToken {
    pub fn new(token_id: u32, lifetime: Duration) -> Self {
        Self {
            token_id,
            created_at: Instant::now(),
            lifetime,
        }
    }

    /// Whether the validity window has fully elapsed.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.lifetime
    }

    /// Renewal is due once 75% of the lifetime has elapsed.
    pub fn should_renew(&self) -> bool {
        self.created_at.elapsed() >= self.lifetime.mul_f64(0.75)
    }
}

/// Read-only view of a channel's token rotation, shared with the decode
/// path. The pipeline worker is the only writer; the decode path only ever
/// asks "is this token id currently acceptable?".
#[derive(Debug)]
pub struct TokenWindow {
    pair: RwLock<TokenPair>,
}

#[derive(Debug, Clone, Copy)]
struct TokenPair {
    current: u32,
    previous: Option<u32>,
}

impl TokenWindow {
    pub fn new(current: u32) -> Self {
        Self {
            pair: RwLock::new(TokenPair {
                current,
                previous: None,
            }),
        }
    }

    /// Install a new current token id, shifting the old one into the
    /// previous slot. The slot is one deep: the oldest id drops out.
    pub fn rotate(&self, current: u32) {
        let mut pair = self.pair.write().unwrap_or_else(PoisonError::into_inner);
        pair.previous = Some(pair.current);
        pair.current = current;
    }

    /// A token id is valid if it is the current or the previous id.
    pub fn is_valid(&self, token_id: u32) -> bool {
        let pair = self.pair.read().unwrap_or_else(PoisonError::into_inner);
        token_id == pair.current || pair.previous == Some(token_id)
    }

    pub fn current(&self) -> u32 {
        self.pair
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }
}

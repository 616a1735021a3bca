// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Key
//!
//! The 256-bit AES key negotiated once per connection. It is held in memory
//! only, never serialized in the clear, never logged, and zeroized on drop.

use rand::{rngs::OsRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Session key length in bytes (AES-256)
pub const SESSION_KEY_LEN: usize = 32;

/// Opaque 256-bit symmetric session key
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Generate a fresh random session key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Rebuild a key from raw material (e.g. after RSA unwrap)
    ///
    /// Returns `None` unless exactly 32 bytes are supplied.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; SESSION_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Raw key material, for the cipher and key wrapping only
    pub(crate) fn expose(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl From<[u8; SESSION_KEY_LEN]> for SessionKey {
    fn from(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Error taxonomy for the hybrid RSA/AES session protocol.
//!
//! ## Error Variants
//!
//! - **KeyGeneration**: RSA key pair could not be generated (fatal for the process)
//! - **KeyWrap**: Session key could not be wrapped under the peer's public key
//! - **KeyUnwrap**: Wrapped session key could not be recovered (aborts the session)
//! - **Padding**: AES-CBC decryption failed (wrong key, corruption, truncation)
//! - **Decode**: Decryption succeeded but the plaintext is not a valid record
//! - **IvReuse**: An IV was seen twice under the same session key
//! - **MalformedEnvelope**: Envelope bytes are too short to hold an IV and one block
//! - **Handshake**: Negotiator driven out of order
//!
//! ## Recoverability
//!
//! `Padding`, `Decode`, `IvReuse` and `MalformedEnvelope` are per-message: the
//! message is dropped and the session continues. `KeyWrap`, `KeyUnwrap` and
//! `Handshake` abort the session. `KeyGeneration` aborts the process.

use thiserror::Error;

/// Errors raised by the cryptographic layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// RSA key pair generation failed
    #[error("RSA key generation failed: {0}")]
    KeyGeneration(String),

    /// Session key could not be wrapped
    #[error("Failed to wrap session key: {0}")]
    KeyWrap(String),

    /// Wrapped session key could not be unwrapped
    ///
    /// The message is intentionally the same for every failure kind.
    #[error("Failed to unwrap session key")]
    KeyUnwrap,

    /// AES-CBC decryption or PKCS#7 unpadding failed
    #[error("Decryption failed: invalid padding (wrong key, corrupted or truncated ciphertext)")]
    Padding,

    /// Plaintext could not be parsed back into a record
    #[error("Failed to decode record after decryption: {0}")]
    Decode(String),

    /// IV already used under this session key
    #[error("IV reuse detected under the current session key: {iv}")]
    IvReuse {
        /// Hex encoding of the repeated IV
        iv: String,
    },

    /// Envelope bytes are structurally invalid
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Handshake state machine violation
    #[error("Handshake error: {0}")]
    Handshake(String),
}

impl CryptoError {
    /// Whether the error only affects a single message
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            CryptoError::Padding
                | CryptoError::Decode(_)
                | CryptoError::IvReuse { .. }
                | CryptoError::MalformedEnvelope(_)
        )
    }
}

impl From<bincode::Error> for CryptoError {
    fn from(err: bincode::Error) -> Self {
        CryptoError::Decode(err.to_string())
    }
}

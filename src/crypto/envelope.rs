// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encrypted Envelope Codec
//!
//! One envelope carries one record:
//!
//! ```text
//! [iv (16 bytes) | ciphertext (AES-256-CBC, PKCS#7, >= 16 bytes)]
//! ```
//!
//! Records are canonicalised with bincode before encryption. Decoding is a
//! two-step process with distinct failures: decryption errors surface as
//! [`CryptoError::Padding`], parse errors after a successful decryption as
//! [`CryptoError::Decode`].
//!
//! [`SessionCipher`] binds a [`SessionKey`] to the IVs already used with it,
//! so that neither side ever accepts a repeated IV within one session.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;

use super::cipher::{self, IV_LEN};
use super::error::CryptoError;
use super::session_key::SessionKey;

/// Smallest valid envelope: an IV plus one ciphertext block
pub const MIN_ENVELOPE_LEN: usize = IV_LEN * 2;

/// Wire unit carrying one encrypted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Random per-message IV
    pub iv: [u8; IV_LEN],
    /// AES-256-CBC ciphertext of the canonical record bytes
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Serialize as `iv || ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse `iv || ciphertext`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "expected at least {} bytes, got {}",
                MIN_ENVELOPE_LEN,
                bytes.len()
            )));
        }
        Self::from_parts(&bytes[..IV_LEN], bytes[IV_LEN..].to_vec())
    }

    /// Build an envelope from a separately transported IV and ciphertext
    pub fn from_parts(iv: &[u8], ciphertext: Vec<u8>) -> Result<Self, CryptoError> {
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| {
            CryptoError::MalformedEnvelope(format!(
                "IV must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            ))
        })?;
        Ok(Self { iv, ciphertext })
    }
}

/// Canonical byte encoding of a record
pub fn canonical_bytes<R: Serialize>(record: &R) -> Result<Vec<u8>, CryptoError> {
    bincode::serialize(record).map_err(|e| CryptoError::Decode(format!("encode failed: {}", e)))
}

/// Inverse of [`canonical_bytes`]
pub fn from_canonical_bytes<R: DeserializeOwned>(bytes: &[u8]) -> Result<R, CryptoError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Encrypt one record under `key` with a fresh IV
pub fn encode<R: Serialize>(record: &R, key: &SessionKey) -> Result<EncryptedEnvelope, CryptoError> {
    let plaintext = canonical_bytes(record)?;
    let iv = cipher::fresh_iv();
    let ciphertext = cipher::encrypt(&plaintext, key, &iv);
    Ok(EncryptedEnvelope { iv, ciphertext })
}

/// Decrypt and parse one envelope under `key`
pub fn decode<R: DeserializeOwned>(envelope: &EncryptedEnvelope, key: &SessionKey) -> Result<R, CryptoError> {
    let plaintext = cipher::decrypt(&envelope.ciphertext, key, &envelope.iv)?;
    from_canonical_bytes(&plaintext)
}

/// Session key plus the IVs already used under it
///
/// One instance lives for exactly one session and is dropped with it.
#[derive(Debug)]
pub struct SessionCipher {
    key: SessionKey,
    used_ivs: HashSet<[u8; IV_LEN]>,
}

impl SessionCipher {
    /// Wrap a freshly negotiated session key
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            used_ivs: HashSet::new(),
        }
    }

    /// Encrypt a record with an IV never used before in this session
    pub fn seal<R: Serialize>(&mut self, record: &R) -> Result<EncryptedEnvelope, CryptoError> {
        let plaintext = canonical_bytes(record)?;
        let mut iv = cipher::fresh_iv();
        while !self.used_ivs.insert(iv) {
            iv = cipher::fresh_iv();
        }
        let ciphertext = cipher::encrypt(&plaintext, &self.key, &iv);
        Ok(EncryptedEnvelope { iv, ciphertext })
    }

    /// Decrypt a record, rejecting IVs already seen in this session
    ///
    /// A rejected envelope does not consume its IV unless decryption
    /// succeeded, so garbage cannot poison the IV set.
    pub fn open<R: DeserializeOwned>(&mut self, envelope: &EncryptedEnvelope) -> Result<R, CryptoError> {
        if self.used_ivs.contains(&envelope.iv) {
            return Err(CryptoError::IvReuse {
                iv: hex::encode(envelope.iv),
            });
        }
        let plaintext = cipher::decrypt(&envelope.ciphertext, &self.key, &envelope.iv)?;
        self.used_ivs.insert(envelope.iv);
        from_canonical_bytes(&plaintext)
    }

    /// Number of distinct IVs used so far
    pub fn ivs_used(&self) -> usize {
        self.used_ivs.len()
    }

    /// The underlying session key
    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

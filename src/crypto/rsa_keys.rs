// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! RSA Key Transport
//!
//! Ephemeral RSA-2048 key pairs used to deliver the AES session key:
//!
//! - The server generates a fresh pair per handshake and publishes the public
//!   half as X.509 SubjectPublicKeyInfo DER.
//! - The client wraps the raw 32-byte session key with RSA PKCS#1 v1.5.
//! - The server unwraps it and drops the private half.
//!
//! ## Security Considerations
//!
//! - Private keys never leave the [`RsaKeyPair`] that created them and are not
//!   serializable
//! - Every unwrap failure maps to the same opaque [`CryptoError::KeyUnwrap`]
//! - PKCS#1 v1.5 decryption is not constant time; a padding-oracle timing
//!   side channel remains a residual risk of this scheme
//! - No forward secrecy: whoever later obtains a private key can recover the
//!   session key of the handshake it served

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroize;

use super::error::CryptoError;
use super::session_key::{SessionKey, SESSION_KEY_LEN};

/// RSA modulus size used for every handshake
pub const RSA_KEY_BITS: usize = 2048;

/// PKCS#1 v1.5 overhead in bytes; the largest wrappable payload is
/// `modulus_len - PKCS1_OVERHEAD`
const PKCS1_OVERHEAD: usize = 11;

/// Ephemeral RSA key pair owned by one server-side handshake
pub struct RsaKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a fresh 2048-bit key pair from the OS CSPRNG
    ///
    /// This is CPU heavy; async callers should run it on the blocking pool.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Public key as X.509 SubjectPublicKeyInfo DER
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::KeyGeneration(format!("public key encoding failed: {}", e)))
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Recover the session key wrapped under this pair's public key
    pub fn unwrap_session_key(&self, wrapped: &[u8]) -> Result<SessionKey, CryptoError> {
        let mut raw = self
            .private
            .decrypt(Pkcs1v15Encrypt, wrapped)
            .map_err(|_| CryptoError::KeyUnwrap)?;
        let key = SessionKey::from_slice(&raw);
        raw.zeroize();
        key.ok_or(CryptoError::KeyUnwrap)
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("bits", &self.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Wrap `key` under the DER-encoded RSA public key received from the server
pub fn wrap_session_key(key: &SessionKey, public_key_der: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let public = parse_public_key(public_key_der)?;

    let max_plaintext = public.size().saturating_sub(PKCS1_OVERHEAD);
    if SESSION_KEY_LEN > max_plaintext {
        return Err(CryptoError::KeyWrap(format!(
            "session key of {} bytes exceeds RSA plaintext bound of {} bytes",
            SESSION_KEY_LEN, max_plaintext
        )));
    }

    public
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, key.expose())
        .map_err(|e| CryptoError::KeyWrap(e.to_string()))
}

/// Parse an X.509 SubjectPublicKeyInfo DER RSA public key
pub fn parse_public_key(public_key_der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| CryptoError::KeyWrap(format!("malformed public key: {}", e)))
}

/// Short SHA-256 fingerprint of a DER public key, safe to log
pub fn fingerprint(public_key_der: &[u8]) -> String {
    let digest = Sha256::digest(public_key_der);
    hex::encode(&digest[..8])
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hybrid Encryption Module
//!
//! This module implements the cryptographic primitives that protect flight
//! records in transit between the producer and the consumer:
//!
//! - **RSA key transport**: Ephemeral RSA-2048 key pair per server-side
//!   handshake; the client wraps its AES key with PKCS#1 v1.5
//! - **Symmetric encryption**: AES-256-CBC with PKCS#7 padding and a fresh
//!   random IV per record
//! - **Envelopes**: `iv || ciphertext` wire unit, one per record
//! - **Session keys**: In-memory only, zeroized on drop, one per connection
//!
//! ## Security Considerations
//!
//! - Session keys are never persisted, logged, or sent in the clear
//! - IVs are never reused under one session key
//! - There is no plaintext fallback: undecryptable data is dropped
//! - The handshake is unauthenticated and has no forward secrecy
//!
//! ## Protocol Flow
//!
//! 1. Server generates an RSA key pair and sends the DER public key
//! 2. Client generates a random AES-256 session key
//! 3. Client wraps the session key under the server's public key and sends it
//! 4. Server unwraps the session key and discards its private key
//! 5. Every record travels as an AES-256-CBC envelope under the session key

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod rsa_keys;
pub mod session_key;

pub use cipher::{decrypt, encrypt, fresh_iv, IV_LEN};
pub use envelope::{decode, encode, EncryptedEnvelope, SessionCipher};
pub use error::CryptoError;
pub use rsa_keys::{fingerprint, wrap_session_key, RsaKeyPair, RSA_KEY_BITS};
pub use session_key::{SessionKey, SESSION_KEY_LEN};

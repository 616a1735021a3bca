// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! AES-256-CBC Encryption/Decryption
//!
//! Bulk encryption for record envelopes: AES-256 in CBC mode with PKCS#7
//! padding and a fresh random 16-byte IV per message.
//!
//! CBC provides confidentiality only. Integrity of a ciphertext is not
//! authenticated; a wrong key or corrupted bytes are detected (with high
//! probability) by the padding check or by record decoding afterwards.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};

use super::error::CryptoError;
use super::session_key::SessionKey;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block and IV size in bytes
pub const IV_LEN: usize = 16;

/// Draw a fresh IV from the OS CSPRNG
///
/// Callers must never reuse a returned value under the same key.
pub fn fresh_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key` with the given IV
///
/// Output length is the plaintext length rounded up to the next full block
/// (a full padding block is appended when already aligned).
pub fn encrypt(plaintext: &[u8], key: &SessionKey, iv: &[u8; IV_LEN]) -> Vec<u8> {
    Aes256CbcEnc::new(key.expose().into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt `ciphertext` under `key` with the given IV
///
/// # Errors
///
/// Returns [`CryptoError::Padding`] if the ciphertext is empty, not a whole
/// number of blocks, or does not unpad correctly.
pub fn decrypt(ciphertext: &[u8], key: &SessionKey, iv: &[u8; IV_LEN]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % IV_LEN != 0 {
        return Err(CryptoError::Padding);
    }

    Aes256CbcDec::new(key.expose().into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let key = SessionKey::generate();
        let iv = fresh_iv();
        let plaintext = b"SU1234 Moscow -> Kazan";

        let ciphertext = encrypt(plaintext, &key, &iv);
        assert_eq!(ciphertext.len() % IV_LEN, 0);
        assert_ne!(&ciphertext[..plaintext.len().min(ciphertext.len())], &plaintext[..]);

        let decrypted = decrypt(&ciphertext, &key, &iv).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_block_aligned_plaintext_gets_full_padding_block() {
        let key = SessionKey::generate();
        let iv = fresh_iv();
        let plaintext = [0x42u8; 32];

        let ciphertext = encrypt(&plaintext, &key, &iv);
        assert_eq!(ciphertext.len(), 48);
        assert_eq!(decrypt(&ciphertext, &key, &iv).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = SessionKey::generate();
        let iv = fresh_iv();

        let ciphertext = encrypt(b"", &key, &iv);
        assert_eq!(ciphertext.len(), 16);
        assert!(decrypt(&ciphertext, &key, &iv).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_ciphertext_is_padding_error() {
        let key = SessionKey::generate();
        let iv = fresh_iv();
        let ciphertext = encrypt(b"some flight record bytes", &key, &iv);

        let truncated = &ciphertext[..ciphertext.len() - 3];
        assert_eq!(decrypt(truncated, &key, &iv), Err(CryptoError::Padding));
        assert_eq!(decrypt(&[], &key, &iv), Err(CryptoError::Padding));
    }

    #[test]
    fn test_same_plaintext_different_iv_differs() {
        let key = SessionKey::generate();
        let plaintext = b"identical";

        let a = encrypt(plaintext, &key, &fresh_iv());
        let b = encrypt(plaintext, &key, &fresh_iv());
        assert_ne!(a, b);
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! RSA key transport of the session key

use flight_courier::crypto::rsa_keys::parse_public_key;
use flight_courier::crypto::{wrap_session_key, CryptoError, RsaKeyPair, SessionKey, RSA_KEY_BITS};

#[test]
fn test_public_key_is_2048_bit_spki() {
    let pair = RsaKeyPair::generate().unwrap();
    let der = pair.public_key_der().unwrap();

    assert!(parse_public_key(&der).is_ok());
    assert_eq!(pair.bits(), RSA_KEY_BITS);
    // SubjectPublicKeyInfo DER starts with a SEQUENCE tag
    assert_eq!(der[0], 0x30);
}

#[test]
fn test_key_wrapped_for_one_pair_does_not_open_with_another() {
    let intended = RsaKeyPair::generate().unwrap();
    let other = RsaKeyPair::generate().unwrap();
    let key = SessionKey::generate();

    let wrapped = wrap_session_key(&key, &intended.public_key_der().unwrap()).unwrap();

    match other.unwrap_session_key(&wrapped) {
        Err(CryptoError::KeyUnwrap) => {}
        Ok(unwrapped) => assert_ne!(unwrapped, key),
        Err(e) => panic!("Unexpected error kind: {:?}", e),
    }
    assert_eq!(intended.unwrap_session_key(&wrapped).unwrap(), key);
}

#[test]
fn test_unwrap_errors_are_indistinguishable() {
    let pair = RsaKeyPair::generate().unwrap();

    let empty = pair.unwrap_session_key(&[]).unwrap_err();
    let zeros = pair.unwrap_session_key(&[0u8; 256]).unwrap_err();
    let oversized = pair.unwrap_session_key(&[0xFFu8; 300]).unwrap_err();

    assert_eq!(empty.to_string(), zeros.to_string());
    assert_eq!(zeros.to_string(), oversized.to_string());
}

#[test]
fn test_wrap_rejects_garbage_public_key() {
    let result = wrap_session_key(&SessionKey::generate(), b"-----BEGIN NONSENSE-----");
    assert!(matches!(result, Err(CryptoError::KeyWrap(_))));
}

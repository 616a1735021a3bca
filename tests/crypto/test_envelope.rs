// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Envelope codec: round-trip, IV uniqueness and wrong-key rejection

use flight_courier::crypto::{decode, encode, CryptoError, EncryptedEnvelope, SessionCipher, SessionKey};
use flight_courier::FlightRecord;
use std::collections::HashSet;

fn record(flight_no: &str) -> FlightRecord {
    FlightRecord {
        flight_no: flight_no.to_string(),
        airline_name: "S7 Airlines".to_string(),
        aircraft_model: "Airbus A320neo".to_string(),
        dep_city: "Novosibirsk".to_string(),
        dep_code: "OVB".to_string(),
        arr_city: "Saint Petersburg".to_string(),
        arr_code: "LED".to_string(),
        passenger_name: "Anna Smirnova".to_string(),
        passport_no: "4011 654321".to_string(),
        flight_date: "2024-07-01".to_string(),
    }
}

#[test]
fn test_round_trip_preserves_record() {
    let key = SessionKey::generate();
    let original = record("S7 5101");

    let envelope = encode(&original, &key).unwrap();
    let decoded: FlightRecord = decode(&envelope, &key).unwrap();

    assert_eq!(decoded, original);
}

#[test]
fn test_round_trip_through_wire_bytes() {
    let key = SessionKey::generate();
    let original = record("S7 5102");

    let bytes = encode(&original, &key).unwrap().to_bytes();
    let envelope = EncryptedEnvelope::from_bytes(&bytes).unwrap();
    let decoded: FlightRecord = decode(&envelope, &key).unwrap();

    assert_eq!(decoded, original);
}

#[test]
fn test_ten_thousand_envelopes_have_distinct_ivs() {
    let key = SessionKey::generate();
    let sample = record("S7 5103");

    let mut ivs = HashSet::new();
    for _ in 0..10_000 {
        let envelope = encode(&sample, &key).unwrap();
        assert!(ivs.insert(envelope.iv), "IV repeated across encodes");
    }
    assert_eq!(ivs.len(), 10_000);
}

#[test]
fn test_session_cipher_tracks_every_iv() {
    let mut cipher = SessionCipher::new(SessionKey::generate());
    let sample = record("S7 5106");

    for _ in 0..100 {
        cipher.seal(&sample).unwrap();
    }
    assert_eq!(cipher.ivs_used(), 100);
}

#[test]
fn test_same_record_encrypts_differently() {
    let key = SessionKey::generate();
    let sample = record("S7 5104");

    let first = encode(&sample, &key).unwrap();
    let second = encode(&sample, &key).unwrap();

    assert_ne!(first.iv, second.iv);
    assert_ne!(first.ciphertext, second.ciphertext);
}

#[test]
fn test_wrong_key_never_yields_the_record() {
    let sample = record("S7 5105");

    for _ in 0..50 {
        let key = SessionKey::generate();
        let other = SessionKey::generate();
        let envelope = encode(&sample, &key).unwrap();

        match decode::<FlightRecord>(&envelope, &other) {
            Err(CryptoError::Padding) | Err(CryptoError::Decode(_)) => {}
            Err(e) => panic!("Unexpected error kind: {:?}", e),
            Ok(decoded) => assert_ne!(decoded, sample),
        }
    }
}

#[test]
fn test_tampered_ciphertext_rejected() {
    let key = SessionKey::generate();
    let sample = record("S7 5106");
    let mut envelope = encode(&sample, &key).unwrap();

    // Dropping the final block leaves a valid length but breaks the padding
    // or the record encoding
    let len = envelope.ciphertext.len();
    envelope.ciphertext.truncate(len - 16);

    let result = decode::<FlightRecord>(&envelope, &key);
    assert!(result.is_err());
}

#[test]
fn test_replayed_envelope_rejected_within_session() {
    let key = SessionKey::generate();
    let mut sender = SessionCipher::new(key.clone());
    let mut receiver = SessionCipher::new(key);

    let envelope = sender.seal(&record("S7 5107")).unwrap();
    let _: FlightRecord = receiver.open(&envelope).unwrap();

    let replay = receiver.open::<FlightRecord>(&envelope);
    assert!(matches!(replay, Err(CryptoError::IvReuse { .. })));
}

#[test]
fn test_short_envelope_is_malformed() {
    let result = EncryptedEnvelope::from_bytes(&[0u8; 31]);
    assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
}

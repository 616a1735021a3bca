// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handshake state machine across both roles

use flight_courier::crypto::{decode, encode, CryptoError};
use flight_courier::protocol::{ClientNegotiator, NegotiationState, ServerNegotiator};
use flight_courier::FlightRecord;

fn record() -> FlightRecord {
    FlightRecord {
        flight_no: "U6 263".to_string(),
        airline_name: "Ural Airlines".to_string(),
        aircraft_model: "Airbus A321".to_string(),
        dep_city: "Yekaterinburg".to_string(),
        dep_code: "SVX".to_string(),
        arr_city: "Sochi".to_string(),
        arr_code: "AER".to_string(),
        passenger_name: "Dmitry Volkov".to_string(),
        passport_no: "6512 778899".to_string(),
        flight_date: "2024-08-20".to_string(),
    }
}

#[tokio::test]
async fn test_both_roles_hold_the_same_key() {
    let mut server = ServerNegotiator::new();
    let public_key = server.begin_async().await.unwrap();

    let client = ClientNegotiator::respond(&public_key).unwrap();
    let server_key = server.complete(&client.wrapped_key).unwrap();

    assert_eq!(server.state(), NegotiationState::Established);
    assert_eq!(server_key, client.session_key);

    // Data sealed by the client opens on the server
    let envelope = encode(&record(), &client.session_key).unwrap();
    let decoded: FlightRecord = decode(&envelope, &server_key).unwrap();
    assert_eq!(decoded, record());
}

#[test]
fn test_corrupted_wrapped_key_fails_the_session() {
    let mut server = ServerNegotiator::new();
    let public_key = server.begin().unwrap();

    let mut client = ClientNegotiator::respond(&public_key).unwrap();
    client.wrapped_key.truncate(100);

    assert_eq!(
        server.complete(&client.wrapped_key),
        Err(CryptoError::KeyUnwrap)
    );
    assert_eq!(server.state(), NegotiationState::Failed);
}

#[test]
fn test_begin_twice_is_rejected() {
    let mut server = ServerNegotiator::new();
    server.begin().unwrap();

    assert!(matches!(server.begin(), Err(CryptoError::Handshake(_))));
    assert_eq!(server.state(), NegotiationState::AwaitingWrappedKey);
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared records for the transport tests

use flight_courier::FlightRecord;

pub fn flight(flight_no: &str) -> FlightRecord {
    FlightRecord {
        flight_no: flight_no.to_string(),
        airline_name: "Aeroflot".to_string(),
        aircraft_model: "Boeing 777-300ER".to_string(),
        dep_city: "Moscow".to_string(),
        dep_code: "SVO".to_string(),
        arr_city: "Vladivostok".to_string(),
        arr_code: "VVO".to_string(),
        passenger_name: "Olga Ivanova".to_string(),
        passport_no: "4519 000111".to_string(),
        flight_date: "2024-11-02".to_string(),
    }
}

pub fn flights(numbers: &[&str]) -> Vec<FlightRecord> {
    numbers.iter().map(|n| flight(n)).collect()
}

pub fn flight_numbers(records: &[FlightRecord]) -> Vec<String> {
    records.iter().map(|r| r.flight_no.clone()).collect()
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FlightService wire messages
//!
//! ```text
//! service FlightService {
//!   rpc GetPublicKey(Empty) returns (PublicKeyResponse);
//!   rpc SetSessionKey(SessionKeyRequest) returns (StatusResponse);
//!   rpc StreamFlights(stream EncryptedPacket) returns (stream StatusResponse);
//! }
//! ```

/// No arguments
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublicKeyResponse {
    /// DER SubjectPublicKeyInfo, despite the field name
    #[prost(bytes = "vec", tag = "1")]
    pub pem_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionKeyRequest {
    /// Session key wrapped under the server public key
    #[prost(bytes = "vec", tag = "1")]
    pub wrapped_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptedPacket {
    #[prost(bytes = "vec", tag = "1")]
    pub iv: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub encrypted_data: Vec<u8>,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

include!(concat!(env!("OUT_DIR"), "/flight_courier.FlightService.rs"));

// ---
// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// ---
// Build script for Flight Courier
//
// Generates the gRPC client and server stubs for the FlightService used by the
// streaming transport. The service is described in Rust with tonic-build's
// manual builder; the message types live in src/transport/stream/proto.rs and
// derive prost::Message directly, so protoc is not required.
//
// Generated file (in OUT_DIR):
// - flight_courier.FlightService.rs: flight_service_client / flight_service_server
//
// Included by:
// - src/transport/stream/proto.rs

use tonic_build::manual::{Builder, Method, Service};

const PROTO_PATH: &str = "crate::transport::stream::proto";
const CODEC: &str = "tonic::codec::ProstCodec";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let flight_service = Service::builder()
        .name("FlightService")
        .package("flight_courier")
        .method(
            Method::builder()
                .name("get_public_key")
                .route_name("GetPublicKey")
                .input_type(format!("{PROTO_PATH}::Empty"))
                .output_type(format!("{PROTO_PATH}::PublicKeyResponse"))
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("set_session_key")
                .route_name("SetSessionKey")
                .input_type(format!("{PROTO_PATH}::SessionKeyRequest"))
                .output_type(format!("{PROTO_PATH}::StatusResponse"))
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("stream_flights")
                .route_name("StreamFlights")
                .input_type(format!("{PROTO_PATH}::EncryptedPacket"))
                .output_type(format!("{PROTO_PATH}::StatusResponse"))
                .codec_path(CODEC)
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[flight_service]);
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handshake protocol shared by all transports

pub mod frame;
pub mod negotiator;

pub use frame::{frame_codec, framed, FramedConnection, HandshakeCarrier, MAX_FRAME_LEN};
pub use negotiator::{
    negotiate_client, negotiate_server, ClientNegotiator, ClientResponse, NegotiationState,
    ServerNegotiator,
};

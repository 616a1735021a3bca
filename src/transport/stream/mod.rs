// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Streaming RPC Transport
//!
//! The key exchange uses two unary calls (`GetPublicKey`, `SetSessionKey`);
//! records then flow over one bidirectional `StreamFlights` call, with one
//! acknowledgement per envelope. The client does not wait for each
//! acknowledgement; a separate task drains them.

pub mod client;
pub mod proto;
pub mod server;

pub use client::{AckSummary, StreamChannel};
pub use server::{FlightStreamService, StreamServer, StreamServerHandle};

/// Request header carrying the client's session id
pub const SESSION_ID_HEADER: &str = "x-session-id";

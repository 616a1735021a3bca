// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod crypto;
pub mod protocol;
pub mod records;
pub mod transport;

pub use config::{Config, TransportMode};
pub use records::FlightRecord;
pub use transport::{Channel, TransferReport, TransportError};

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport error taxonomy

use std::time::Duration;
use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors raised by the channels and their server counterparts
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket level I/O failure outside the data path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer went away mid-transfer; `sent` records were delivered before it
    #[error("Connection lost after {sent} records: {source}")]
    ConnectionLost {
        sent: usize,
        #[source]
        source: std::io::Error,
    },

    /// Local key material could not be produced or consumed
    #[error("Handshake failed: {0}")]
    Handshake(#[from] CryptoError),

    /// The peer refused the handshake
    #[error("Handshake rejected by peer: {0}")]
    HandshakeRejected(String),

    /// Data operation attempted before `negotiate()` completed
    #[error("Channel has not negotiated a session key")]
    NotNegotiated,

    /// Channel already closed
    #[error("Channel is closed")]
    Closed,

    /// Frame truncated, oversized, or out of protocol order
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Server did not complete the stream in time
    #[error("Stream did not complete within {timeout:?}")]
    StreamTimeout { timeout: Duration },

    #[error("RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Failed to connect: {0}")]
    Connect(#[from] tonic::transport::Error),

    /// Broker failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Broker refused a message; `sent` records were published before it
    #[error("Publish failed after {sent} records: {reason}")]
    PublishFailed { sent: usize, reason: String },
}

impl TransportError {
    /// Whether the peer vanished (as opposed to a protocol error)
    pub fn is_connection_lost(&self) -> bool {
        match self {
            TransportError::ConnectionLost { .. } => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Records delivered before a data-path failure, when known
    pub fn records_sent(&self) -> Option<usize> {
        match self {
            TransportError::ConnectionLost { sent, .. }
            | TransportError::PublishFailed { sent, .. } => Some(*sent),
            _ => None,
        }
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Key exchange side-channel for the queue transport
//!
//! The broker never sees key material. The session key travels over a short
//! lived TCP connection using the same two framed messages as the socket
//! transport; the connection is closed as soon as the key is delivered.

use bytes::Bytes;
use futures::SinkExt;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use super::key_slot::SessionKeySlot;
use super::TransportError;
use crate::crypto::SessionKey;
use crate::protocol::{framed, negotiate_client, negotiate_server};

/// Server end of the side-channel
pub struct SideChannelListener {
    listener: TcpListener,
}

impl SideChannelListener {
    pub async fn bind(address: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address).await?;
        info!("Key exchange side-channel listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept a single producer, negotiate, and publish the key to `slot`
    ///
    /// The listener is consumed: one side-channel serves one session.
    pub async fn accept_once(self, slot: SessionKeySlot) -> Result<SocketAddr, TransportError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!("Side-channel connection from {}", peer);

        let mut conn = framed(stream);
        let key = negotiate_server(&mut conn).await?;
        drop(conn);

        slot.set(key)
            .await
            .map_err(|e| TransportError::HandshakeRejected(e.to_string()))?;
        info!("Side-channel handshake with {} complete", peer);
        Ok(peer)
    }
}

/// Producer end: connect, negotiate, disconnect
pub async fn negotiate_over_side_channel(address: &str) -> Result<SessionKey, TransportError> {
    let stream = TcpStream::connect(address).await?;
    let mut conn = framed(stream);
    let key = negotiate_client(&mut conn).await?;
    // The wrapped key is already flushed; the server may have hung up first
    if let Err(e) = SinkExt::<Bytes>::close(&mut conn).await {
        debug!("Side-channel close to {}: {}", address, e);
    }
    Ok(key)
}

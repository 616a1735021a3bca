// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Direct Socket Transport
//!
//! One TCP connection per session. After the two handshake frames every
//! frame carries exactly one envelope; the client half-closes when done and
//! the server ends the session on the clean EOF.

use bytes::Bytes;
use futures::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::session::{ReceivingSession, SessionStats};
use super::TransportError;
use crate::crypto::{EncryptedEnvelope, SessionCipher};
use crate::protocol::{framed, negotiate_client, negotiate_server, FramedConnection, HandshakeCarrier};
use crate::records::{FlightRecord, RecordSink};

/// Outcome of one server-side session
#[derive(Debug)]
pub struct SessionReport {
    pub peer: SocketAddr,
    pub result: Result<SessionStats, TransportError>,
}

/// Consumer-side socket server
pub struct SocketServer {
    address: String,
    sink: Arc<dyn RecordSink>,
}

impl SocketServer {
    pub fn new(address: impl Into<String>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            address: address.into(),
            sink,
        }
    }

    /// Bind and spawn the accept loop
    pub async fn start(self) -> Result<SocketServerHandle, TransportError> {
        let listener = TcpListener::bind(&self.address).await?;
        let local_addr = listener.local_addr()?;
        info!("Socket server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let sink = self.sink;

        let accept_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer)) => {
                                let sink = sink.clone();
                                let report_tx = report_tx.clone();
                                tokio::spawn(async move {
                                    let result = handle_connection(stream, peer, sink).await;
                                    if let Err(e) = &result {
                                        warn!("Session from {} ended with error: {}", peer, e);
                                    }
                                    report_tx.send(SessionReport { peer, result }).ok();
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Shutting down socket server");
                        break;
                    }
                }
            }
        });

        Ok(SocketServerHandle {
            local_addr,
            reports: report_rx,
            shutdown_tx: Some(shutdown_tx),
            accept_handle: Some(accept_handle),
        })
    }
}

/// Running socket server
pub struct SocketServerHandle {
    local_addr: SocketAddr,
    reports: mpsc::UnboundedReceiver<SessionReport>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    accept_handle: Option<JoinHandle<()>>,
}

impl SocketServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next finished session
    pub async fn next_report(&mut self) -> Option<SessionReport> {
        self.reports.recv().await
    }

    /// Stop accepting connections; sessions already running finish on their own
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).await.ok();
        }
        if let Some(handle) = self.accept_handle.take() {
            handle.await.ok();
            info!("Socket server shutdown complete");
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    sink: Arc<dyn RecordSink>,
) -> Result<SessionStats, TransportError> {
    debug!("New connection from {}", peer);
    let mut conn = framed(stream);

    let key = negotiate_server(&mut conn).await?;
    info!("Session established with {}", peer);

    let mut session = ReceivingSession::new(key, sink);
    while let Some(frame) = conn.recv_frame().await? {
        let envelope = EncryptedEnvelope::from_bytes(&frame)
            .map_err(|e| TransportError::MalformedFrame(e.to_string()))?;
        session.accept(&envelope).await;
    }

    debug!("Peer {} closed the connection", peer);
    Ok(session.finish())
}

/// Producer-side socket channel
pub struct SocketChannel {
    peer: SocketAddr,
    conn: Option<FramedConnection>,
    cipher: Option<SessionCipher>,
    sent: usize,
}

impl SocketChannel {
    pub async fn connect(address: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).await?;
        let peer = stream.peer_addr()?;
        debug!("Connected to {}", peer);
        Ok(Self {
            peer,
            conn: Some(framed(stream)),
            cipher: None,
            sent: 0,
        })
    }

    /// Receive the server key and send back the wrapped session key
    pub async fn negotiate(&mut self) -> Result<(), TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::Closed)?;
        if self.cipher.is_some() {
            return Ok(());
        }
        let key = negotiate_client(conn).await?;
        self.cipher = Some(SessionCipher::new(key));
        info!("Session established with {}", self.peer);
        Ok(())
    }

    /// Encrypt and write one record
    pub async fn send(&mut self, record: &FlightRecord) -> Result<(), TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::Closed)?;
        let cipher = self.cipher.as_mut().ok_or(TransportError::NotNegotiated)?;

        let envelope = cipher.seal(record)?;
        let sent = self.sent;
        conn.send(Bytes::from(envelope.to_bytes()))
            .await
            .map_err(|source| TransportError::ConnectionLost { sent, source })?;

        self.sent += 1;
        Ok(())
    }

    /// Half-close the connection and destroy the session key
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.cipher = None;
        if let Some(mut conn) = self.conn.take() {
            let sent = self.sent;
            SinkExt::<Bytes>::close(&mut conn)
                .await
                .map_err(|source| TransportError::ConnectionLost { sent, source })?;
            debug!("Closed connection to {} after {} records", self.peer, sent);
        }
        Ok(())
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn is_negotiated(&self) -> bool {
        self.cipher.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{sample_record, MemorySink};

    #[tokio::test]
    async fn test_send_before_negotiate_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut channel = SocketChannel::connect(&addr).await.unwrap();
        let result = channel.send(&sample_record("SU1")).await;
        assert!(matches!(result, Err(TransportError::NotNegotiated)));
        assert_eq!(channel.sent(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut channel = SocketChannel::connect(&addr).await.unwrap();
        channel.close().await.unwrap();
        channel.close().await.unwrap();

        let result = channel.send(&sample_record("SU1")).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_malformed_envelope_ends_session() {
        let sink = MemorySink::new();
        let mut server = SocketServer::new("127.0.0.1:0", Arc::new(sink.clone()))
            .start()
            .await
            .unwrap();

        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut conn = framed(stream);
        negotiate_client(&mut conn).await.unwrap();
        // Shorter than an IV plus one block
        conn.send_frame(&[0u8; 8]).await.unwrap();

        let report = server.next_report().await.unwrap();
        assert!(matches!(report.result, Err(TransportError::MalformedFrame(_))));
        assert_eq!(sink.count().await, 0);

        server.shutdown().await;
        server.shutdown().await;
    }
}

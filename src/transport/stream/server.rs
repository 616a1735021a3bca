// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FlightService server
//!
//! Sessions are keyed by the `x-session-id` request header when the client
//! sends one, otherwise by the peer address of the HTTP/2 connection. Each
//! entry moves through the negotiator states across the two unary calls and
//! is taken out of the table by the `StreamFlights` call that uses it.
//! Entries older than the session TTL are evicted on every insert, so an
//! abandoned handshake never keeps its private key or session key alive.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

use super::proto::flight_service_server::{FlightService, FlightServiceServer};
use super::proto::{Empty, EncryptedPacket, PublicKeyResponse, SessionKeyRequest, StatusResponse};
use super::SESSION_ID_HEADER;
use crate::crypto::{EncryptedEnvelope, SessionKey};
use crate::protocol::ServerNegotiator;
use crate::records::RecordSink;
use crate::transport::session::{DeliveryOutcome, ReceivingSession};
use crate::transport::TransportError;

/// Acknowledgements buffered per stream before backpressure applies
const ACK_BUFFER: usize = 64;

/// How long a session may sit in the table before its stream opens
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60);

enum PeerSession {
    Negotiating(ServerNegotiator),
    Established(SessionKey),
}

struct SessionEntry {
    session: PeerSession,
    created: Instant,
}

impl SessionEntry {
    fn new(session: PeerSession) -> Self {
        Self {
            session,
            created: Instant::now(),
        }
    }
}

type SessionTable = HashMap<String, SessionEntry>;

/// gRPC implementation of the consuming side
#[derive(Clone)]
pub struct FlightStreamService {
    sessions: Arc<RwLock<SessionTable>>,
    sink: Arc<dyn RecordSink>,
    session_ttl: Duration,
}

impl FlightStreamService {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            sink,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sessions negotiating or waiting for their stream
    pub async fn pending_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn session_id<T>(request: &Request<T>) -> String {
        if let Some(id) = request
            .metadata()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            return id.to_string();
        }
        match request.remote_addr() {
            Some(addr) => addr.to_string(),
            None => "unknown-peer".to_string(),
        }
    }

    /// Drop entries whose stream never arrived; their keys go with them
    fn evict_stale(&self, sessions: &mut SessionTable) {
        let before = sessions.len();
        sessions.retain(|_, entry| entry.created.elapsed() < self.session_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("🗑️  Evicted {} abandoned sessions", evicted);
        }
    }

    /// Insert after evicting stale entries
    async fn store(&self, session_id: String, session: PeerSession) -> usize {
        let mut sessions = self.sessions.write().await;
        self.evict_stale(&mut sessions);
        if sessions
            .insert(session_id.clone(), SessionEntry::new(session))
            .is_some()
        {
            debug!("Replaced earlier session for {}", session_id);
        }
        sessions.len()
    }

    /// Take a live entry out of the table
    async fn take(&self, session_id: &str) -> Option<PeerSession> {
        let mut sessions = self.sessions.write().await;
        self.evict_stale(&mut sessions);
        sessions.remove(session_id).map(|entry| entry.session)
    }
}

fn ack_for(outcome: &DeliveryOutcome) -> StatusResponse {
    match outcome {
        DeliveryOutcome::Persisted => StatusResponse::ok("record persisted"),
        other => StatusResponse::failed(other.to_string()),
    }
}

#[tonic::async_trait]
impl FlightService for FlightStreamService {
    async fn get_public_key(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<PublicKeyResponse>, Status> {
        let session_id = Self::session_id(&request);

        let mut negotiator = ServerNegotiator::new();
        let public_key = negotiator
            .begin_async()
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        let pending = self
            .store(session_id.clone(), PeerSession::Negotiating(negotiator))
            .await;
        info!(
            "🔐 Key exchange started for {} (sessions: {})",
            session_id, pending
        );

        Ok(Response::new(PublicKeyResponse {
            pem_key: public_key,
        }))
    }

    async fn set_session_key(
        &self,
        request: Request<SessionKeyRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let session_id = Self::session_id(&request);
        let wrapped_key = request.into_inner().wrapped_key;

        let negotiator = match self.take(&session_id).await {
            Some(PeerSession::Negotiating(negotiator)) => negotiator,
            Some(PeerSession::Established(key)) => {
                self.store(session_id, PeerSession::Established(key)).await;
                return Ok(Response::new(StatusResponse::failed(
                    "session key already established",
                )));
            }
            None => {
                warn!("SetSessionKey from {} without a key exchange", session_id);
                return Ok(Response::new(StatusResponse::failed(
                    "no key exchange in progress; call GetPublicKey first",
                )));
            }
        };

        // The table lock is not held while the private key works
        match negotiator.complete_async(wrapped_key).await {
            Ok(key) => {
                self.store(session_id.clone(), PeerSession::Established(key))
                    .await;
                info!("🔑 Session key stored for {}", session_id);
                Ok(Response::new(StatusResponse::ok("session key accepted")))
            }
            Err(e) => {
                warn!("Session for {} discarded: {}", session_id, e);
                Ok(Response::new(StatusResponse::failed(e.to_string())))
            }
        }
    }

    type StreamFlightsStream =
        Pin<Box<dyn Stream<Item = Result<StatusResponse, Status>> + Send + 'static>>;

    async fn stream_flights(
        &self,
        request: Request<Streaming<EncryptedPacket>>,
    ) -> Result<Response<Self::StreamFlightsStream>, Status> {
        let session_id = Self::session_id(&request);

        let key = match self.take(&session_id).await {
            Some(PeerSession::Established(key)) => key,
            _ => {
                warn!("StreamFlights from {} before key exchange", session_id);
                let refusal = StatusResponse::failed("session key not established");
                let stream = tokio_stream::once(Ok::<_, Status>(refusal));
                return Ok(Response::new(Box::pin(stream) as Self::StreamFlightsStream));
            }
        };

        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel::<Result<StatusResponse, Status>>(ACK_BUFFER);
        let mut session = ReceivingSession::new(key, self.sink.clone());

        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(packet)) => {
                        let outcome =
                            match EncryptedEnvelope::from_parts(&packet.iv, packet.encrypted_data) {
                                Ok(envelope) => session.accept(&envelope).await,
                                Err(e) => session.reject(e),
                            };
                        if tx.send(Ok(ack_for(&outcome))).await.is_err() {
                            warn!("Client {} stopped reading acknowledgements", session_id);
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Client {} finished streaming", session_id);
                        break;
                    }
                    Err(status) => {
                        warn!("Stream from {} failed: {}", session_id, status);
                        break;
                    }
                }
            }
            let stats = session.finish();
            info!(
                "🗑️  Session for {} closed after {} records",
                session_id, stats.received
            );
        });

        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::StreamFlightsStream
        ))
    }
}

/// Binds and serves [`FlightStreamService`]
pub struct StreamServer {
    address: String,
    sink: Arc<dyn RecordSink>,
    session_ttl: Duration,
}

impl StreamServer {
    pub fn new(address: impl Into<String>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            address: address.into(),
            sink,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    /// Evict handshakes whose stream has not opened within `ttl`
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub async fn start(self) -> Result<StreamServerHandle, TransportError> {
        let listener = TcpListener::bind(&self.address).await?;
        let local_addr = listener.local_addr()?;
        info!("Stream server listening on {}", local_addr);

        let service = FlightStreamService::new(self.sink).with_session_ttl(self.session_ttl);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let incoming = TcpListenerStream::new(listener);

        let handle = tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(FlightServiceServer::new(service))
                .serve_with_incoming_shutdown(incoming, async {
                    shutdown_rx.await.ok();
                }),
        );

        Ok(StreamServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

/// Running stream server
pub struct StreamServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
}

impl StreamServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://` endpoint clients connect to
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).ok();
        }
        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(Ok(())) => info!("Stream server shutdown complete"),
                Ok(Err(e)) => error!("Stream server failed: {}", e),
                Err(e) => error!("Stream server task panicked: {}", e),
            }
        }
    }
}

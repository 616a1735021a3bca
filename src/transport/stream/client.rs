// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FlightService client channel

use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel as GrpcChannel;
use tonic::{Request, Status};
use tracing::{debug, info, warn};

use super::proto::flight_service_client::FlightServiceClient;
use super::proto::{Empty, EncryptedPacket, SessionKeyRequest};
use super::SESSION_ID_HEADER;
use crate::crypto::{fingerprint, SessionCipher};
use crate::protocol::ClientNegotiator;
use crate::records::FlightRecord;
use crate::transport::TransportError;

/// Packets buffered between `send` and the HTTP/2 stream
const OUTBOUND_BUFFER: usize = 64;

/// Server acknowledgements collected by the drain task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckSummary {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Message of the most recent failed acknowledgement
    pub last_failure: Option<String>,
}

/// Producer-side streaming channel
pub struct StreamChannel {
    client: FlightServiceClient<GrpcChannel>,
    session_id: String,
    completion_timeout: Duration,
    cipher: Option<SessionCipher>,
    outbound: Option<mpsc::Sender<EncryptedPacket>>,
    acks: Option<JoinHandle<Result<AckSummary, TransportError>>>,
    summary: Option<AckSummary>,
    sent: usize,
    closed: bool,
}

impl StreamChannel {
    /// Connect to `endpoint` (e.g. `http://127.0.0.1:50051`)
    pub async fn connect(endpoint: &str, completion_timeout: Duration) -> Result<Self, TransportError> {
        let client = FlightServiceClient::connect(endpoint.to_string()).await?;
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!("Connected to {} as session {}", endpoint, session_id);
        Ok(Self {
            client,
            session_id,
            completion_timeout,
            cipher: None,
            outbound: None,
            acks: None,
            summary: None,
            sent: 0,
            closed: false,
        })
    }

    fn request<T>(&self, message: T) -> Result<Request<T>, TransportError> {
        let mut request = Request::new(message);
        let value = self
            .session_id
            .parse()
            .map_err(|_| Status::internal("session id is not valid metadata"))?;
        request.metadata_mut().insert(SESSION_ID_HEADER, value);
        Ok(request)
    }

    /// Exchange keys over the two unary calls, then open the stream
    pub async fn negotiate(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.cipher.is_some() {
            return Ok(());
        }

        let request = self.request(Empty {})?;
        let public_key = self
            .client
            .get_public_key(request)
            .await?
            .into_inner()
            .pem_key;
        info!("Received public key {}", fingerprint(&public_key));

        let response = ClientNegotiator::respond(&public_key)?;
        let request = self.request(SessionKeyRequest {
            wrapped_key: response.wrapped_key,
        })?;
        let status = self
            .client
            .set_session_key(request)
            .await?
            .into_inner();
        if !status.success {
            return Err(TransportError::HandshakeRejected(status.message));
        }

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let request = self.request(ReceiverStream::new(rx))?;
        let inbound = self
            .client
            .stream_flights(request)
            .await?
            .into_inner();

        self.acks = Some(tokio::spawn(drain_acks(inbound)));
        self.outbound = Some(tx);
        self.cipher = Some(SessionCipher::new(response.session_key));
        info!("Session {} established", self.session_id);
        Ok(())
    }

    /// Queue one record on the stream without waiting for its acknowledgement
    pub async fn send(&mut self, record: &FlightRecord) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let cipher = self.cipher.as_mut().ok_or(TransportError::NotNegotiated)?;
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotNegotiated)?;

        let envelope = cipher.seal(record)?;
        let packet = EncryptedPacket {
            iv: envelope.iv.to_vec(),
            encrypted_data: envelope.ciphertext,
        };

        let sent = self.sent;
        outbound.send(packet).await.map_err(|_| TransportError::ConnectionLost {
            sent,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "stream closed by server"),
        })?;
        self.sent += 1;
        Ok(())
    }

    /// Half-close the stream and wait for the server to finish
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cipher = None;
        self.outbound = None;

        let Some(mut acks) = self.acks.take() else {
            return Ok(());
        };

        let summary = match tokio::time::timeout(self.completion_timeout, &mut acks).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(TransportError::Rpc(Status::internal(format!(
                    "acknowledgement task failed: {}",
                    e
                ))))
            }
            Err(_) => {
                acks.abort();
                warn!(
                    "Server did not complete session {} within {:?}",
                    self.session_id, self.completion_timeout
                );
                return Err(TransportError::StreamTimeout {
                    timeout: self.completion_timeout,
                });
            }
        };

        info!(
            "Server acknowledged {} of {} records ({} failed)",
            summary.succeeded, self.sent, summary.failed
        );
        self.summary = Some(summary);
        Ok(())
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Acknowledgements, available after a successful `close`
    pub fn ack_summary(&self) -> Option<&AckSummary> {
        self.summary.as_ref()
    }
}

async fn drain_acks(
    mut inbound: tonic::Streaming<super::proto::StatusResponse>,
) -> Result<AckSummary, TransportError> {
    let mut summary = AckSummary::default();
    while let Some(status) = inbound.message().await? {
        summary.received += 1;
        if status.success {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
            warn!("Server rejected record: {}", status.message);
            summary.last_failure = Some(status.message);
        }
    }
    Ok(summary)
}

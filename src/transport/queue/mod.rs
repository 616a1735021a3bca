// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Message Queue Transport
//!
//! Envelopes are relayed through a broker; the key exchange happens out of
//! band over the TCP side-channel. On the consuming side two tasks race:
//!
//! - the handshake task fills the [`SessionKeySlot`] once the side-channel
//!   negotiation completes
//! - the consumer task reads deliveries and checks the slot for each one
//!
//! A delivery consumed before the key exists is rejected with
//! [`DeliveryOutcome::RejectedNoKey`]: it is logged and discarded, never
//! decrypted with a missing key and never retried.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(feature = "amqp")]
pub use amqp::AmqpQueue;
pub use memory::MemoryQueue;

use super::key_slot::SessionKeySlot;
use super::session::{DeliveryOutcome, ReceivingSession, SessionStats};
use super::side_channel::{negotiate_over_side_channel, SideChannelListener};
use super::TransportError;
use crate::crypto::{EncryptedEnvelope, SessionCipher};
use crate::records::{FlightRecord, RecordSink};

/// Stream of raw message payloads
pub type Deliveries = BoxStream<'static, Vec<u8>>;

/// Broker abstraction
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish one message payload
    async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Start consuming; each item is one message payload
    async fn consume(&self) -> Result<Deliveries, TransportError>;

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Turns deliveries into persisted records, one at a time
pub struct QueueConsumer {
    slot: SessionKeySlot,
    sink: Arc<dyn RecordSink>,
    session: Option<ReceivingSession>,
    rejected_no_key: usize,
}

impl QueueConsumer {
    pub fn new(slot: SessionKeySlot, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            slot,
            sink,
            session: None,
            rejected_no_key: 0,
        }
    }

    /// Handle one delivery without waiting for the session key
    pub async fn handle_delivery(&mut self, payload: &[u8]) -> DeliveryOutcome {
        let key = match self.slot.get().await {
            Ok(key) => key,
            Err(e) => {
                self.rejected_no_key += 1;
                warn!("Rejecting message: {}", e);
                return DeliveryOutcome::RejectedNoKey;
            }
        };

        let sink = &self.sink;
        let session = self
            .session
            .get_or_insert_with(|| ReceivingSession::new(key, sink.clone()));

        match EncryptedEnvelope::from_bytes(payload) {
            Ok(envelope) => session.accept(&envelope).await,
            Err(e) => session.reject(e),
        }
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self
            .session
            .as_ref()
            .map(ReceivingSession::stats)
            .unwrap_or_default();
        stats.received += self.rejected_no_key;
        stats.rejected_no_key = self.rejected_no_key;
        stats
    }

    /// End the session and report its counters
    pub fn finish(mut self) -> SessionStats {
        let stats = self.stats();
        if let Some(session) = self.session.take() {
            session.finish();
        }
        stats
    }
}

/// Consumer-side queue receiver: side-channel handshake plus consumer loop
pub struct QueueReceiver;

impl QueueReceiver {
    /// Spawn the handshake task and the consumer task
    ///
    /// The two tasks share only the key slot and run concurrently.
    pub async fn start(
        listener: SideChannelListener,
        queue: Arc<dyn MessageQueue>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<QueueReceiverHandle, TransportError> {
        let slot = SessionKeySlot::new();
        let mut deliveries = queue.consume().await?;

        let handshake = tokio::spawn(listener.accept_once(slot.clone()));

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let mut consumer = QueueConsumer::new(slot.clone(), sink);

        let consumer_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    delivery = deliveries.next() => {
                        match delivery {
                            Some(payload) => {
                                let outcome = consumer.handle_delivery(&payload).await;
                                debug!("Delivery {}", outcome);
                                outcome_tx.send(outcome).ok();
                            }
                            None => {
                                info!("Queue closed");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Shutting down queue consumer");
                        break;
                    }
                }
            }
            consumer.finish()
        });

        Ok(QueueReceiverHandle {
            slot,
            queue,
            outcomes: outcome_rx,
            handshake: Some(handshake),
            consumer: Some(consumer_handle),
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Running queue receiver
pub struct QueueReceiverHandle {
    slot: SessionKeySlot,
    queue: Arc<dyn MessageQueue>,
    outcomes: mpsc::UnboundedReceiver<DeliveryOutcome>,
    handshake: Option<JoinHandle<Result<SocketAddr, TransportError>>>,
    consumer: Option<JoinHandle<SessionStats>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl QueueReceiverHandle {
    pub fn key_slot(&self) -> &SessionKeySlot {
        &self.slot
    }

    /// Outcome of the next consumed delivery
    pub async fn next_outcome(&mut self) -> Option<DeliveryOutcome> {
        self.outcomes.recv().await
    }

    /// Detach the handshake task, e.g. to await it from another task
    pub fn take_handshake(&mut self) -> Option<JoinHandle<Result<SocketAddr, TransportError>>> {
        self.handshake.take()
    }

    /// Wait for the side-channel handshake; returns the producer address
    pub async fn wait_for_handshake(&mut self) -> Result<SocketAddr, TransportError> {
        let handle = self.take_handshake().ok_or_else(|| {
            TransportError::HandshakeRejected("handshake already awaited".to_string())
        })?;
        handle.await.map_err(|e| {
            TransportError::HandshakeRejected(format!("handshake task failed: {}", e))
        })?
    }

    /// Stop consuming, destroy the key and report the session counters
    pub async fn shutdown(&mut self) -> SessionStats {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).await.ok();
        }
        if let Some(handle) = self.handshake.take() {
            handle.abort();
        }
        let stats = match self.consumer.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                error!("Queue consumer task failed: {}", e);
                SessionStats::default()
            }),
            None => SessionStats::default(),
        };
        if let Err(e) = self.queue.close().await {
            warn!("Failed to close queue: {}", e);
        }
        self.slot.clear().await;
        stats
    }
}

/// Producer-side queue channel
pub struct QueueChannel {
    side_channel: String,
    queue: Arc<dyn MessageQueue>,
    cipher: Option<SessionCipher>,
    sent: usize,
    closed: bool,
}

impl QueueChannel {
    pub fn new(side_channel: impl Into<String>, queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            side_channel: side_channel.into(),
            queue,
            cipher: None,
            sent: 0,
            closed: false,
        }
    }

    /// Run the side-channel handshake to completion
    pub async fn negotiate(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.cipher.is_some() {
            return Ok(());
        }
        let key = negotiate_over_side_channel(&self.side_channel).await?;
        self.cipher = Some(SessionCipher::new(key));
        info!("Session key delivered over side-channel {}", self.side_channel);
        Ok(())
    }

    /// Publish one record as one message
    pub async fn send(&mut self, record: &FlightRecord) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let cipher = self.cipher.as_mut().ok_or(TransportError::NotNegotiated)?;
        let envelope = cipher.seal(record)?;
        let sent = self.sent;
        self.queue
            .publish(envelope.to_bytes())
            .await
            .map_err(|e| TransportError::PublishFailed {
                sent,
                reason: e.to_string(),
            })?;
        self.sent += 1;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cipher = None;
        self.queue.close().await
    }

    pub fn sent(&self) -> usize {
        self.sent
    }
}

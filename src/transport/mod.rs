// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport Bindings
//!
//! Three interchangeable ways to carry encrypted envelopes from the producer
//! to the consumer:
//!
//! - **socket**: direct length-prefixed TCP ([`socket`])
//! - **queue**: message broker relay, key exchange over a TCP side-channel
//!   ([`queue`], [`side_channel`], [`key_slot`])
//! - **stream**: bidirectional gRPC stream ([`stream`])
//!
//! The producer picks one once, from configuration, as a [`Channel`].

pub mod error;
pub mod key_slot;
pub mod queue;
pub mod session;
pub mod side_channel;
pub mod socket;
pub mod stream;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub use error::TransportError;
pub use key_slot::{KeyAlreadySet, KeyNotReady, SessionKeySlot};
pub use queue::{
    MemoryQueue, MessageQueue, QueueChannel, QueueConsumer, QueueReceiver, QueueReceiverHandle,
};
pub use session::{DeliveryOutcome, ReceivingSession, SessionStats};
pub use side_channel::{negotiate_over_side_channel, SideChannelListener};
pub use socket::{SessionReport, SocketChannel, SocketServer, SocketServerHandle};
pub use stream::{AckSummary, FlightStreamService, StreamChannel, StreamServer, StreamServerHandle};

use crate::config::{Config, TransportMode};
use crate::records::FlightRecord;

/// Summary of one producer run
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub transport: TransportMode,
    pub sent: usize,
    pub elapsed: Duration,
    /// Server acknowledgements (stream transport only)
    pub acks: Option<AckSummary>,
}

/// Producer-side channel over the configured transport
pub enum Channel {
    Socket(SocketChannel),
    Queue(QueueChannel),
    Stream(StreamChannel),
}

impl Channel {
    /// Open the transport selected by `config.transport`
    pub async fn connect(config: &Config) -> Result<Self, TransportError> {
        match config.transport {
            TransportMode::Socket => Ok(Channel::Socket(
                SocketChannel::connect(&config.socket.address()).await?,
            )),
            TransportMode::Queue => {
                let queue = connect_queue(config).await?;
                Ok(Channel::Queue(QueueChannel::new(
                    config.queue.side_channel_address(),
                    queue,
                )))
            }
            TransportMode::Stream => Ok(Channel::Stream(
                StreamChannel::connect(
                    &config.stream.endpoint(),
                    config.stream.completion_timeout(),
                )
                .await?,
            )),
        }
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            Channel::Socket(_) => TransportMode::Socket,
            Channel::Queue(_) => TransportMode::Queue,
            Channel::Stream(_) => TransportMode::Stream,
        }
    }

    pub async fn negotiate(&mut self) -> Result<(), TransportError> {
        match self {
            Channel::Socket(channel) => channel.negotiate().await,
            Channel::Queue(channel) => channel.negotiate().await,
            Channel::Stream(channel) => channel.negotiate().await,
        }
    }

    pub async fn send(&mut self, record: &FlightRecord) -> Result<(), TransportError> {
        match self {
            Channel::Socket(channel) => channel.send(record).await,
            Channel::Queue(channel) => channel.send(record).await,
            Channel::Stream(channel) => channel.send(record).await,
        }
    }

    /// Idempotent; destroys the session key
    pub async fn close(&mut self) -> Result<(), TransportError> {
        match self {
            Channel::Socket(channel) => channel.close().await,
            Channel::Queue(channel) => channel.close().await,
            Channel::Stream(channel) => channel.close().await,
        }
    }

    /// Records successfully handed to the transport
    pub fn sent(&self) -> usize {
        match self {
            Channel::Socket(channel) => channel.sent(),
            Channel::Queue(channel) => channel.sent(),
            Channel::Stream(channel) => channel.sent(),
        }
    }

    /// Negotiate if needed, send every record in order, then close
    ///
    /// `progress` is called with the running count after each record.
    pub async fn send_all<F>(
        &mut self,
        records: &[FlightRecord],
        mut progress: F,
    ) -> Result<TransferReport, TransportError>
    where
        F: FnMut(usize),
    {
        let started = Instant::now();
        self.negotiate().await?;

        for record in records {
            if let Err(e) = self.send(record).await {
                if let Err(close_err) = self.close().await {
                    warn!("Failed to close channel after send error: {}", close_err);
                }
                return Err(e);
            }
            progress(self.sent());
        }
        self.close().await?;

        let acks = match self {
            Channel::Stream(channel) => channel.ack_summary().cloned(),
            _ => None,
        };
        let report = TransferReport {
            transport: self.mode(),
            sent: self.sent(),
            elapsed: started.elapsed(),
            acks,
        };
        info!(
            "Sent {} records over {} in {:?}",
            report.sent, report.transport, report.elapsed
        );
        Ok(report)
    }
}

/// Connect to the configured broker
#[cfg(feature = "amqp")]
pub async fn connect_queue(config: &Config) -> Result<Arc<dyn MessageQueue>, TransportError> {
    Ok(Arc::new(queue::AmqpQueue::connect(&config.queue).await?))
}

/// Connect to the configured broker
#[cfg(not(feature = "amqp"))]
pub async fn connect_queue(_config: &Config) -> Result<Arc<dyn MessageQueue>, TransportError> {
    Err(TransportError::Queue(
        "queue transport needs a broker; rebuild with the `amqp` feature".to_string(),
    ))
}

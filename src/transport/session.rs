// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Receiving side of an established session
//!
//! Shared by all three server bindings: open an envelope, hand the record to
//! the sink, count the outcome. Per-message failures never end the session.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crypto::{CryptoError, EncryptedEnvelope, SessionCipher, SessionKey};
use crate::records::{FlightRecord, RecordSink};

/// Records between progress log lines
pub const PROGRESS_INTERVAL: usize = 10;

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Decrypted, decoded and saved
    Persisted,
    /// Arrived before the session key existed; not persisted, not retried
    RejectedNoKey,
    /// Could not be decrypted or decoded; discarded
    Dropped(String),
    /// Decoded but the sink refused it
    SinkFailed(String),
}

impl DeliveryOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, DeliveryOutcome::Persisted)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Persisted => f.write_str("persisted"),
            DeliveryOutcome::RejectedNoKey => f.write_str("rejected: session key not ready"),
            DeliveryOutcome::Dropped(reason) => write!(f, "dropped: {}", reason),
            DeliveryOutcome::SinkFailed(reason) => write!(f, "sink failed: {}", reason),
        }
    }
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub received: usize,
    pub persisted: usize,
    pub dropped: usize,
    pub sink_failures: usize,
    /// Queue deliveries that arrived before the session key
    pub rejected_no_key: usize,
}

/// Session key, IV history and sink for one established session
pub struct ReceivingSession {
    cipher: SessionCipher,
    sink: Arc<dyn RecordSink>,
    stats: SessionStats,
}

impl ReceivingSession {
    pub fn new(key: SessionKey, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            cipher: SessionCipher::new(key),
            sink,
            stats: SessionStats::default(),
        }
    }

    /// Open one envelope and persist its record
    pub async fn accept(&mut self, envelope: &EncryptedEnvelope) -> DeliveryOutcome {
        self.stats.received += 1;

        let record: FlightRecord = match self.cipher.open(envelope) {
            Ok(record) => record,
            Err(e) => return self.drop_message(e),
        };

        match self.sink.save(record).await {
            Ok(()) => {
                self.stats.persisted += 1;
                if self.stats.persisted % PROGRESS_INTERVAL == 0 {
                    info!("📦 {} records persisted", self.stats.persisted);
                }
                DeliveryOutcome::Persisted
            }
            Err(e) => {
                self.stats.sink_failures += 1;
                warn!("Failed to persist record: {}", e);
                DeliveryOutcome::SinkFailed(e.to_string())
            }
        }
    }

    /// Count a message that was discarded before decryption
    pub fn reject(&mut self, error: CryptoError) -> DeliveryOutcome {
        self.stats.received += 1;
        self.drop_message(error)
    }

    fn drop_message(&mut self, error: CryptoError) -> DeliveryOutcome {
        self.stats.dropped += 1;
        warn!("Dropping message: {}", error);
        DeliveryOutcome::Dropped(error.to_string())
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// End the session, destroying the key
    pub fn finish(self) -> SessionStats {
        debug!(
            "Session finished: {} received, {} persisted, {} dropped, {} sink failures",
            self.stats.received, self.stats.persisted, self.stats.dropped, self.stats.sink_failures
        );
        info!("✅ Session complete: {} records persisted", self.stats.persisted);
        self.stats
    }
}

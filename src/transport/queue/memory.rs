// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-process message queue

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::{Deliveries, MessageQueue};
use crate::transport::TransportError;

/// Unbounded FIFO queue with a single consumer
///
/// Clones share the same queue, so a producer and a consumer in one process
/// can each hold their own handle.
#[derive(Clone)]
pub struct MemoryQueue {
    name: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>>,
    published: Arc<AtomicUsize>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages published so far
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(payload)
            .map_err(|_| TransportError::Queue(format!("queue '{}' has no consumer", self.name)))?;
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self) -> Result<Deliveries, TransportError> {
        let rx = self.rx.lock().await.take().ok_or_else(|| {
            TransportError::Queue(format!("queue '{}' already has a consumer", self.name))
        })?;
        debug!("Consumer attached to queue '{}'", self.name);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

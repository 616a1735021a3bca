// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Record sinks for the consuming side

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{FlightRecord, PersistError, RecordSink};

/// Appends one JSON object per line to a file
///
/// Writes are serialised through a mutex so concurrent sessions never
/// interleave partial lines.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open (or create) the output file in append mode
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PersistError::Storage(format!("open {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn save(&self, record: FlightRecord) -> Result<(), PersistError> {
        record.validate()?;

        let mut line =
            serde_json::to_vec(&record).map_err(|e| PersistError::Storage(e.to_string()))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))?;

        debug!(
            "Saved flight: {} ({})",
            record.flight_no, record.passenger_name
        );
        Ok(())
    }
}

/// Collects records in memory, in arrival order
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<FlightRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far
    pub async fn records(&self) -> Vec<FlightRecord> {
        self.records.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn save(&self, record: FlightRecord) -> Result<(), PersistError> {
        record.validate()?;
        self.records.lock().await.push(record);
        Ok(())
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Record sources for the producer side

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{FlightRecord, RecordSource, SourceError};

/// Reads a JSON array of records from a file
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl RecordSource for JsonFileSource {
    async fn read_all(&self) -> Result<Vec<FlightRecord>, SourceError> {
        let path = self.path.display().to_string();
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: path.clone(),
                source,
            })?;

        let records: Vec<FlightRecord> =
            serde_json::from_str(&content).map_err(|e| SourceError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        info!("📂 Loaded {} records from {}", records.len(), path);
        Ok(records)
    }
}

/// Fixed in-memory record list
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<FlightRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<FlightRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn read_all(&self) -> Result<Vec<FlightRecord>, SourceError> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::sample_record;
    use std::io::Write;

    #[tokio::test]
    async fn test_json_file_source_preserves_order() {
        let records = vec![sample_record("A1"), sample_record("B2"), sample_record("C3")];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&records).unwrap().as_bytes())
            .unwrap();

        let source = JsonFileSource::new(file.path());
        let loaded = source.read_all().await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = JsonFileSource::new("/nonexistent/flights.json");
        let result = source.read_all().await;
        assert!(matches!(result, Err(SourceError::Io { .. })));
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let source = JsonFileSource::new(file.path());
        let result = source.read_all().await;
        assert!(matches!(result, Err(SourceError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemorySource::new(vec![sample_record("X9")]);
        assert_eq!(source.read_all().await.unwrap().len(), 1);
    }
}

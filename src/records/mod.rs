// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Flight Records and Their Collaborators
//!
//! The transport layer treats a [`FlightRecord`] as an opaque serializable
//! blob. Where records come from and where they end up is delegated to two
//! collaborator traits:
//!
//! - [`RecordSource`]: produces the full, ordered list of records to ship
//! - [`RecordSink`]: persists one decoded record on the consuming side

pub mod sink;
pub mod source;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sink::{JsonLinesSink, MemorySink};
pub use source::{JsonFileSource, MemorySource};

/// Date format of [`FlightRecord::flight_date`]
pub const FLIGHT_DATE_FORMAT: &str = "%Y-%m-%d";

/// One denormalised flight booking row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    pub flight_no: String,
    pub airline_name: String,
    pub aircraft_model: String,
    pub dep_city: String,
    pub dep_code: String,
    pub arr_city: String,
    pub arr_code: String,
    pub passenger_name: String,
    pub passport_no: String,
    /// `YYYY-MM-DD`
    pub flight_date: String,
}

impl FlightRecord {
    /// Check the fields the store relies on for its lookups
    pub fn validate(&self) -> Result<(), PersistError> {
        let required = [
            ("flightNo", &self.flight_no),
            ("depCode", &self.dep_code),
            ("arrCode", &self.arr_code),
            ("passportNo", &self.passport_no),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(PersistError::Invalid {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        NaiveDate::parse_from_str(&self.flight_date, FLIGHT_DATE_FORMAT).map_err(|e| {
            PersistError::Invalid {
                field: "flightDate".to_string(),
                reason: format!("'{}' is not YYYY-MM-DD: {}", self.flight_date, e),
            }
        })?;

        Ok(())
    }
}

/// Errors raised while reading the source records
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read records from {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse records from {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Errors raised while persisting a record
#[derive(Error, Debug)]
pub enum PersistError {
    /// Record failed validation and was not written
    #[error("Invalid record field '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Producer-side collaborator: the finite record sequence to ship
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Materialise every record, in shipping order
    async fn read_all(&self) -> Result<Vec<FlightRecord>, SourceError>;
}

/// Consumer-side collaborator: durable store for decoded records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist one record
    async fn save(&self, record: FlightRecord) -> Result<(), PersistError>;
}

#[cfg(test)]
pub(crate) fn sample_record(flight_no: &str) -> FlightRecord {
    FlightRecord {
        flight_no: flight_no.to_string(),
        airline_name: "Aeroflot".to_string(),
        aircraft_model: "Sukhoi Superjet 100".to_string(),
        dep_city: "Moscow".to_string(),
        dep_code: "SVO".to_string(),
        arr_city: "Kazan".to_string(),
        arr_code: "KZN".to_string(),
        passenger_name: "Ivan Petrov".to_string(),
        passport_no: "4509 123456".to_string(),
        flight_date: "2024-03-15".to_string(),
    }
}

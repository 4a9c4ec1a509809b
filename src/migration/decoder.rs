//! Record decoding with per-record error isolation.

use crate::error::MigrationError;
use crate::types::{City, SourceRecord};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Number of decode failures logged at warn level before dropping to debug.
const WARN_LIMIT: u64 = 5;

/// A single record that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// Zero-based position of the record in the source.
    pub ordinal: u64,
    pub reason: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.ordinal, self.reason)
    }
}

/// Decode one serialized record.
pub fn decode_record(raw: &[u8], ordinal: u64) -> Result<City, DecodeError> {
    serde_json::from_slice::<SourceRecord>(raw)
        .map_err(|e| e.to_string())
        .and_then(SourceRecord::into_city)
        .map_err(|reason| DecodeError { ordinal, reason })
}

/// Decode one already-parsed record.
pub fn decode_value(value: Value, ordinal: u64) -> Result<City, DecodeError> {
    serde_json::from_value::<SourceRecord>(value)
        .map_err(|e| e.to_string())
        .and_then(SourceRecord::into_city)
        .map_err(|reason| DecodeError { ordinal, reason })
}

/// Running count of decode failures against a fixed ceiling.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    ceiling: u64,
    seen: u64,
}

impl ErrorBudget {
    pub fn new(ceiling: u64) -> Self {
        Self { ceiling, seen: 0 }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Count a failure. Errors once the count goes past the ceiling.
    pub fn record(&mut self, err: &DecodeError) -> Result<(), MigrationError> {
        self.seen += 1;
        if self.seen <= WARN_LIMIT {
            warn!(ordinal = err.ordinal, reason = %err.reason, "Skipping malformed record");
        } else {
            debug!(ordinal = err.ordinal, reason = %err.reason, "Skipping malformed record");
        }

        if self.seen > self.ceiling {
            return Err(MigrationError::DecodeCeiling {
                errors: self.seen,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}

//! Structured error types for the migration pipeline.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Source errors
    SourceMissing,
    SourceIo,
    SourceMalformed,

    // Decode errors
    DecodeCeiling,
    NoRecords,

    // Store errors
    BatchCommit,
    StoreError,
    PreferencesError,

    // Run control
    Cancelled,
    TimedOut,
    WorkerFailed,
    StrategiesExhausted,
}

/// Failure of one migration strategy or of the whole run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("source asset '{0}' not found")]
    SourceMissing(String),

    #[error("failed reading source: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed source at byte {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    #[error("decode error ceiling exceeded: {errors} errors (ceiling {ceiling})")]
    DecodeCeiling { errors: u64, ceiling: u64 },

    #[error("no records decoded ({errors} decode errors)")]
    NoRecords { errors: u64 },

    #[error("batch {batch} commit failed: {reason}")]
    BatchCommit { batch: u64, reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("preferences error: {0}")]
    Preferences(String),

    #[error("migration cancelled")]
    Cancelled,

    #[error("migration timed out after {0} seconds")]
    TimedOut(u64),

    #[error("migration worker failed: {0}")]
    WorkerFailed(String),

    #[error("all {0} migration strategies failed")]
    Exhausted(usize),
}

impl MigrationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MigrationError::SourceMissing(_) => ErrorCode::SourceMissing,
            MigrationError::Io(_) => ErrorCode::SourceIo,
            MigrationError::Malformed { .. } => ErrorCode::SourceMalformed,
            MigrationError::DecodeCeiling { .. } => ErrorCode::DecodeCeiling,
            MigrationError::NoRecords { .. } => ErrorCode::NoRecords,
            MigrationError::BatchCommit { .. } => ErrorCode::BatchCommit,
            MigrationError::Store(_) => ErrorCode::StoreError,
            MigrationError::Preferences(_) => ErrorCode::PreferencesError,
            MigrationError::Cancelled => ErrorCode::Cancelled,
            MigrationError::TimedOut(_) => ErrorCode::TimedOut,
            MigrationError::WorkerFailed(_) => ErrorCode::WorkerFailed,
            MigrationError::Exhausted(_) => ErrorCode::StrategiesExhausted,
        }
    }

    /// Whether this error stops the whole fallback chain rather than just the
    /// current strategy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::SourceMissing(_)
                | MigrationError::Store(_)
                | MigrationError::Preferences(_)
                | MigrationError::Cancelled
                | MigrationError::TimedOut(_)
                | MigrationError::WorkerFailed(_)
                | MigrationError::Exhausted(_)
        )
    }

    // Convenience constructors

    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        MigrationError::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    pub fn store(err: anyhow::Error) -> Self {
        MigrationError::Store(format!("{:#}", err))
    }

    pub fn preferences(err: anyhow::Error) -> Self {
        MigrationError::Preferences(format!("{:#}", err))
    }

    pub fn batch_commit(batch: u64, err: anyhow::Error) -> Self {
        MigrationError::BatchCommit {
            batch,
            reason: format!("{:#}", err),
        }
    }
}

/// Result type for migration operations.
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;

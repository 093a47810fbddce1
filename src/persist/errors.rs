//! Persistence error types following ERRORS.md
//!
//! The edit log layer carries its own code-based errors; this module wraps
//! them together with snapshot and manifest failures behind one type for the
//! `TxStatePersistence` trait.

use std::io;

use thiserror::Error;

use crate::txlog::TxLogError;

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistenceError>;

/// Errors from the durable state layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Edit log failure (append, fsync, corruption).
    #[error(transparent)]
    Log(#[from] TxLogError),

    /// State snapshot write or fsync failed.
    #[error("State snapshot write failed: {message}")]
    SnapshotWrite {
        message: String,
        #[source]
        source: io::Error,
    },

    /// State snapshot unreadable or checksum mismatch.
    #[error("State snapshot corrupted: {message}")]
    SnapshotCorruption { message: String },

    /// Manifest serialization or parse failure.
    #[error("Manifest error: {message}")]
    Manifest { message: String },

    /// Manifest write, rename, or fsync failure.
    #[error("Manifest io error: {message}")]
    ManifestIo {
        message: String,
        #[source]
        source: io::Error,
    },
}

impl PersistenceError {
    pub fn snapshot_write(message: impl Into<String>, source: io::Error) -> Self {
        PersistenceError::SnapshotWrite {
            message: message.into(),
            source,
        }
    }

    pub fn snapshot_corruption(message: impl Into<String>) -> Self {
        PersistenceError::SnapshotCorruption {
            message: message.into(),
        }
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        PersistenceError::Manifest {
            message: message.into(),
        }
    }

    pub fn manifest_io(message: impl Into<String>, source: io::Error) -> Self {
        PersistenceError::ManifestIo {
            message: message.into(),
            source,
        }
    }

    /// The error code per ERRORS.md §2, for structured logging.
    pub fn code(&self) -> &'static str {
        match self {
            PersistenceError::Log(e) => e.code().code(),
            PersistenceError::SnapshotWrite { .. } => "VTG_SNAPSHOT_WRITE_FAILED",
            PersistenceError::SnapshotCorruption { .. } => "VTG_SNAPSHOT_CORRUPTION",
            PersistenceError::Manifest { .. } => "VTG_MANIFEST_ERROR",
            PersistenceError::ManifestIo { .. } => "VTG_MANIFEST_IO",
        }
    }

    /// Whether the active instance must stop serving.
    ///
    /// Per ERRORS.md §4 the manager halts on any persistence failure while
    /// active; this flag distinguishes log-layer ERROR severity for logging.
    pub fn is_fatal(&self) -> bool {
        match self {
            PersistenceError::Log(e) => e.is_fatal(),
            _ => true,
        }
    }
}

//! Recovery error types following ERRORS.md
//!
//! Error codes:
//! - VTG_RECOVERY_CORRUPTION (FATAL): snapshot or log unreadable/inconsistent
//! - VTG_RECOVERY_REPLAY (FATAL): replay violated state machine rules
//!
//! Per ERRORS.md §4 both abort startup and require operator intervention.

use std::fmt;

use crate::persist::PersistenceError;

/// Result type for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Errors raised while reconstructing state at startup.
#[derive(Debug)]
pub enum RecoveryError {
    /// The durable state could not be read (corruption, io failure).
    Corruption(PersistenceError),
    /// The log or snapshot contradicted the state machine rules
    /// (PERSISTENCE.md §5).
    Replay { message: String },
}

impl RecoveryError {
    pub fn replay(message: impl Into<String>) -> Self {
        RecoveryError::Replay {
            message: message.into(),
        }
    }

    /// The error code per ERRORS.md §2, for structured logging.
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryError::Corruption(_) => "VTG_RECOVERY_CORRUPTION",
            RecoveryError::Replay { .. } => "VTG_RECOVERY_REPLAY",
        }
    }
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryError::Corruption(e) => {
                write!(f, "[FATAL] VTG_RECOVERY_CORRUPTION: {}", e)
            }
            RecoveryError::Replay { message } => {
                write!(f, "[FATAL] VTG_RECOVERY_REPLAY: {}", message)
            }
        }
    }
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecoveryError::Corruption(e) => Some(e),
            RecoveryError::Replay { .. } => None,
        }
    }
}

impl From<PersistenceError> for RecoveryError {
    fn from(error: PersistenceError) -> Self {
        RecoveryError::Corruption(error)
    }
}

//! Edit log error types following ERRORS.md
//!
//! Error codes:
//! - VTG_TXLOG_APPEND_FAILED (ERROR severity)
//! - VTG_TXLOG_FSYNC_FAILED (FATAL severity)
//! - VTG_TXLOG_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels per ERRORS.md §1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the instance continues serving.
    Error,
    /// The active instance must stop serving.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Edit-log-specific error codes per ERRORS.md §2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLogErrorCode {
    /// Edit log write failed.
    AppendFailed,
    /// Edit log fsync failed.
    FsyncFailed,
    /// Edit log checksum or structure failure.
    Corruption,
}

impl TxLogErrorCode {
    /// The string code as listed in ERRORS.md §2.
    pub fn code(&self) -> &'static str {
        match self {
            TxLogErrorCode::AppendFailed => "VTG_TXLOG_APPEND_FAILED",
            TxLogErrorCode::FsyncFailed => "VTG_TXLOG_FSYNC_FAILED",
            TxLogErrorCode::Corruption => "VTG_TXLOG_CORRUPTION",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TxLogErrorCode::AppendFailed => Severity::Error,
            TxLogErrorCode::FsyncFailed => Severity::Fatal,
            TxLogErrorCode::Corruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for TxLogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Edit log error with full context.
#[derive(Debug)]
pub struct TxLogError {
    code: TxLogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl TxLogError {
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: TxLogErrorCode::AppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: TxLogErrorCode::FsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::Corruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Corruption error carrying the byte offset where it was detected.
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Corruption error carrying the sequence number involved.
    pub fn corruption_at_sequence(sequence: u64, reason: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("sequence_number: {}", sequence)),
            source: None,
        }
    }

    pub fn code(&self) -> TxLogErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Whether this error requires the instance to stop serving.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for TxLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for TxLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for edit log operations.
pub type TxLogResult<T> = Result<T, TxLogError>;

//! Edit log reader with strict corruption detection
//!
//! Per PERSISTENCE.md §5:
//! - Records are read strictly in order, checksums validated on every record
//! - Sequence numbers must be strictly increasing
//! - A checksum or structure failure on a complete record is fatal
//! - A torn final record (crash mid-append) is a clean end of log: the
//!   record was never acknowledged

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::errors::{TxLogError, TxLogResult};
use super::record::{TxLogRecord, MIN_RECORD_SIZE};

/// Sequential reader over `edits.log`.
pub struct TxLogReader {
    log_path: PathBuf,
    /// Full file contents; edit logs are bounded by snapshot truncation
    /// (PERSISTENCE.md §4) so whole-file reads are fine.
    data: Vec<u8>,
    offset: usize,
    last_sequence: u64,
    torn_tail: bool,
}

impl TxLogReader {
    /// Opens an edit log for reading.
    pub fn open(log_path: &Path) -> TxLogResult<Self> {
        let mut file = File::open(log_path).map_err(|e| {
            TxLogError::corruption(format!(
                "Failed to open edit log {}: {}",
                log_path.display(),
                e
            ))
        })?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| {
            TxLogError::corruption(format!(
                "Failed to read edit log {}: {}",
                log_path.display(),
                e
            ))
        })?;

        Ok(Self {
            log_path: log_path.to_path_buf(),
            data,
            offset: 0,
            last_sequence: 0,
            torn_tail: false,
        })
    }

    /// Opens the edit log under a data directory, if present.
    pub fn open_from_data_dir(data_dir: &Path) -> TxLogResult<Option<Self>> {
        let log_path = data_dir.join("txlog").join("edits.log");
        if !log_path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::open(&log_path)?))
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn current_offset(&self) -> u64 {
        self.offset as u64
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence
    }

    /// Whether reading stopped at an incomplete final record.
    pub fn reached_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at a clean end of log, including a torn final
    /// record (check [`reached_torn_tail`](Self::reached_torn_tail)).
    ///
    /// # Errors
    ///
    /// `VTG_TXLOG_CORRUPTION` if a complete record fails checksum or
    /// structural validation, or sequence numbers are not strictly
    /// increasing.
    pub fn read_next(&mut self) -> TxLogResult<Option<TxLogRecord>> {
        if self.torn_tail || self.offset >= self.data.len() {
            return Ok(None);
        }

        let remaining = &self.data[self.offset..];

        // Not even a length prefix left, or the prefix promises more bytes
        // than the file holds: torn tail from a crash mid-append.
        if remaining.len() < MIN_RECORD_SIZE {
            self.torn_tail = true;
            return Ok(None);
        }
        let record_length =
            u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(TxLogError::corruption_at_offset(
                self.offset as u64,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if record_length > remaining.len() {
            self.torn_tail = true;
            return Ok(None);
        }

        let (record, consumed) = TxLogRecord::deserialize(remaining).map_err(|e| {
            TxLogError::corruption_at_offset(self.offset as u64, e.to_string())
        })?;

        if record.sequence <= self.last_sequence {
            return Err(TxLogError::corruption_at_sequence(
                record.sequence,
                format!(
                    "Sequence numbers not strictly increasing (previous: {})",
                    self.last_sequence
                ),
            ));
        }

        self.offset += consumed;
        self.last_sequence = record.sequence;
        Ok(Some(record))
    }

    /// Reads all remaining records.
    pub fn read_all(&mut self) -> TxLogResult<Vec<TxLogRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }
}

//! Edit log writer with fsync enforcement
//!
//! Per PERSISTENCE.md §1:
//! - Every append is followed by fsync
//! - Acknowledgment before fsync is forbidden
//!
//! The log is append-only, a single file, opened for exclusive write by the
//! one active manager instance.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::observability::{LogLevel, Logger};

use super::errors::{TxLogError, TxLogResult};
use super::reader::TxLogReader;
use super::record::{TxEdit, TxLogRecord};

/// Appends framed edit records to `<data_dir>/txlog/edits.log`.
#[derive(Debug)]
pub struct TxLogWriter {
    log_path: PathBuf,
    file: File,
    /// Next sequence number to assign (starts at 1 per log generation).
    next_sequence: u64,
}

impl TxLogWriter {
    /// Opens or creates the edit log under the given data directory.
    pub fn open(data_dir: &Path) -> TxLogResult<Self> {
        let log_dir = data_dir.join("txlog");
        let log_path = log_dir.join("edits.log");

        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to create log directory: {}", log_dir.display()),
                    e,
                )
            })?;
        }

        let (next_sequence, valid_len, torn) = Self::scan(&log_path)?;

        // A torn final record (crash mid-append, PERSISTENCE.md §5) must be
        // trimmed before appending, or every later record would sit
        // unreachable behind the incomplete one.
        if torn {
            let file = OpenOptions::new().write(true).open(&log_path).map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to open edit log for trim: {}", log_path.display()),
                    e,
                )
            })?;
            file.set_len(valid_len).map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to trim torn edit log tail: {}", log_path.display()),
                    e,
                )
            })?;
            file.sync_all().map_err(|e| {
                TxLogError::fsync_failed(
                    format!("Failed to fsync trimmed edit log: {}", log_path.display()),
                    e,
                )
            })?;
            let offset = valid_len.to_string();
            Logger::log(
                LogLevel::Warn,
                "txlog_torn_tail",
                &[("trimmed_to_offset", offset.as_str())],
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to open edit log: {}", log_path.display()),
                    e,
                )
            })?;

        Ok(Self {
            log_path,
            file,
            next_sequence,
        })
    }

    /// Scans the existing log: next sequence number, byte length of the
    /// complete-record prefix, and whether a torn tail follows it.
    ///
    /// Returns (1, 0, false) for an empty or missing log.
    fn scan(log_path: &Path) -> TxLogResult<(u64, u64, bool)> {
        let metadata = match fs::metadata(log_path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((1, 0, false)),
            Err(e) => {
                return Err(TxLogError::append_failed(
                    "Failed to read edit log metadata",
                    e,
                ))
            }
        };
        if metadata.len() == 0 {
            return Ok((1, 0, false));
        }

        let mut reader = TxLogReader::open(log_path)?;
        let mut max_sequence = 0u64;
        while let Some(record) = reader.read_next()? {
            max_sequence = max_sequence.max(record.sequence);
        }
        Ok((
            max_sequence + 1,
            reader.current_offset(),
            reader.reached_torn_tail(),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Appends one edit, fsyncs, and returns the assigned sequence number.
    ///
    /// Per PERSISTENCE.md §1 the operation that triggered the edit may only
    /// be acknowledged after this returns.
    ///
    /// # Errors
    ///
    /// - `VTG_TXLOG_APPEND_FAILED` if the write fails
    /// - `VTG_TXLOG_FSYNC_FAILED` if fsync fails (FATAL)
    pub fn append(&mut self, edit: &TxEdit) -> TxLogResult<u64> {
        let sequence = self.next_sequence;
        let record = TxLogRecord::new(sequence, edit.clone());
        let serialized = record.serialize();

        self.file.write_all(&serialized).map_err(|e| {
            TxLogError::append_failed(
                format!("Failed to write edit record at sequence {}", sequence),
                e,
            )
        })?;

        self.file.sync_all().map_err(|e| {
            TxLogError::fsync_failed(
                format!("fsync failed after edit append at sequence {}", sequence),
                e,
            )
        })?;

        // Only advance after a successful fsync.
        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Truncates the log after a durable snapshot (PERSISTENCE.md §4).
    ///
    /// The old file is removed, an empty file created and fsynced, and the
    /// log directory fsynced. Sequence numbers restart at 1. On failure the
    /// log is left in its original state where possible.
    pub fn truncate(&mut self) -> TxLogResult<()> {
        let log_dir = self.log_path.parent().unwrap_or(Path::new("."));

        if self.log_path.exists() {
            fs::remove_file(&self.log_path).map_err(|e| {
                TxLogError::append_failed(
                    format!(
                        "Failed to remove edit log during truncation: {}",
                        self.log_path.display()
                    ),
                    e,
                )
            })?;
        }

        let new_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!(
                        "Failed to create new edit log during truncation: {}",
                        self.log_path.display()
                    ),
                    e,
                )
            })?;
        new_file.sync_all().map_err(|e| {
            TxLogError::fsync_failed(
                format!("Failed to fsync new edit log: {}", self.log_path.display()),
                e,
            )
        })?;

        let dir_handle = OpenOptions::new().read(true).open(log_dir).map_err(|e| {
            TxLogError::append_failed(
                format!("Failed to open log directory for fsync: {}", log_dir.display()),
                e,
            )
        })?;
        dir_handle.sync_all().map_err(|e| {
            TxLogError::fsync_failed(
                format!("Failed to fsync log directory: {}", log_dir.display()),
                e,
            )
        })?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!(
                        "Failed to reopen edit log after truncation: {}",
                        self.log_path.display()
                    ),
                    e,
                )
            })?;

        self.file = file;
        self.next_sequence = 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::txn::{ChangeKey, ChangeSet, TransactionType, TxId};

    use super::*;

    fn start_edit(id: u64) -> TxEdit {
        TxEdit::Start {
            id: TxId::new(id),
            tx_type: TransactionType::Short,
            start_ms: 100,
            expiry_ms: 30_100,
        }
    }

    fn commit_edit(tx_id: u64, commit_id: u64) -> TxEdit {
        TxEdit::Commit {
            tx_id: TxId::new(tx_id),
            commit_id: TxId::new(commit_id),
            change_set: [ChangeKey::from("row1")].into_iter().collect::<ChangeSet>(),
        }
    }

    #[test]
    fn test_writer_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("txlog");
        assert!(!log_dir.exists());

        let _writer = TxLogWriter::open(temp_dir.path()).unwrap();

        assert!(log_dir.exists());
        assert!(log_dir.join("edits.log").exists());
    }

    #[test]
    fn test_sequence_numbers_start_at_one_and_increment() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();

        assert_eq!(writer.next_sequence_number(), 1);
        assert_eq!(writer.append(&start_edit(1_000_000)).unwrap(), 1);
        assert_eq!(writer.append(&commit_edit(1_000_000, 2_000_000)).unwrap(), 2);
        assert_eq!(writer.last_sequence_number(), 2);
    }

    #[test]
    fn test_writer_reopens_with_correct_sequence() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();
            writer.append(&start_edit(1_000_000)).unwrap();
            writer.append(&start_edit(1_000_001)).unwrap();
        }
        {
            let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();
            assert_eq!(writer.next_sequence_number(), 3);
            assert_eq!(writer.append(&start_edit(1_000_002)).unwrap(), 3);
        }
    }

    #[test]
    fn test_records_durable_and_readable_after_append() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();
            writer.append(&start_edit(1_000_000)).unwrap();
            writer.append(&commit_edit(1_000_000, 2_000_000)).unwrap();
        }

        let log_path = temp_dir.path().join("txlog").join("edits.log");
        let mut reader = TxLogReader::open(&log_path).unwrap();

        let first = reader.read_next().unwrap().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.edit, start_edit(1_000_000));

        let second = reader.read_next().unwrap().unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.edit, commit_edit(1_000_000, 2_000_000));

        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_truncate_empties_log_and_resets_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();
        writer.append(&start_edit(1_000_000)).unwrap();
        writer.append(&start_edit(1_000_001)).unwrap();

        writer.truncate().unwrap();
        assert_eq!(writer.next_sequence_number(), 1);

        let log_path = temp_dir.path().join("txlog").join("edits.log");
        let mut reader = TxLogReader::open(&log_path).unwrap();
        assert!(reader.read_next().unwrap().is_none());

        // New writes restart at sequence 1.
        assert_eq!(writer.append(&start_edit(1_000_002)).unwrap(), 1);
    }

    #[test]
    fn test_torn_tail_trimmed_before_new_appends() {
        use std::io::Write as _;

        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("txlog").join("edits.log");

        {
            let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();
            writer.append(&start_edit(1_000_000)).unwrap();
        }

        // Crash mid-append: a length prefix promising more than the file
        // holds.
        {
            let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
            file.write_all(&300u32.to_le_bytes()).unwrap();
            file.write_all(&[0xCD; 7]).unwrap();
        }

        // Reopening trims the torn record; new appends land readable.
        let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();
        assert_eq!(writer.next_sequence_number(), 2);
        writer.append(&start_edit(1_000_001)).unwrap();

        let mut reader = TxLogReader::open(&log_path).unwrap();
        let records: Vec<_> = std::iter::from_fn(|| reader.read_next().unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert!(!reader.reached_torn_tail());
    }

    #[test]
    fn test_truncate_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = TxLogWriter::open(temp_dir.path()).unwrap();
            writer.append(&start_edit(1_000_000)).unwrap();
            writer.truncate().unwrap();
            writer.append(&start_edit(1_000_001)).unwrap();
        }
        {
            let writer = TxLogWriter::open(temp_dir.path()).unwrap();
            assert_eq!(writer.next_sequence_number(), 2);
        }
    }
}

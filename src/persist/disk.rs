//! Durable persistence backed by the edit log and snapshot files
//!
//! Per PERSISTENCE.md: edits are appended write-ahead with fsync; snapshots
//! serialize the full registry state, the manifest is switched atomically,
//! and the edit log is truncated once the snapshot is durable.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::txlog::{TxEdit, TxLogError, TxLogReader, TxLogWriter};

use super::errors::{PersistResult, PersistenceError};
use super::manifest::SnapshotManifest;
use super::snapshot::TxStateSnapshot;
use super::TxStatePersistence;

/// Disk layout: `<data_dir>/txlog/edits.log`, `<data_dir>/snapshots/`.
#[derive(Debug)]
pub struct DiskPersistence {
    data_dir: PathBuf,
    /// Present while this instance holds the log (active); released on
    /// standby.
    writer: Option<TxLogWriter>,
    /// Set by recovery when the log ended at an incomplete record.
    torn_tail: bool,
}

impl DiskPersistence {
    /// Opens (creating directories as needed) the durable state under
    /// `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> PersistResult<Self> {
        let data_dir = data_dir.into();
        let snapshot_dir = data_dir.join("snapshots");
        if !snapshot_dir.exists() {
            fs::create_dir_all(&snapshot_dir).map_err(|e| {
                PersistenceError::snapshot_write(
                    format!(
                        "Failed to create snapshot directory: {}",
                        snapshot_dir.display()
                    ),
                    e,
                )
            })?;
        }
        let writer = TxLogWriter::open(&data_dir)?;
        Ok(Self {
            data_dir,
            writer: Some(writer),
            torn_tail: false,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether the last replay stopped at a torn final record.
    pub fn replay_hit_torn_tail(&self) -> bool {
        self.torn_tail
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    fn manifest_path(&self) -> PathBuf {
        self.snapshot_dir().join("MANIFEST.json")
    }

    fn writer_mut(&mut self) -> PersistResult<&mut TxLogWriter> {
        self.writer.as_mut().ok_or_else(|| {
            PersistenceError::from(TxLogError::corruption(
                "Edit log released (instance is standby)",
            ))
        })
    }

    /// Deletes snapshot files other than the one the manifest points at.
    /// Best-effort: failures are ignored, stale files are harmless.
    fn remove_superseded_snapshots(&self, keep: &str) {
        let dir = self.snapshot_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".snap") && name != keep {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

impl TxStatePersistence for DiskPersistence {
    fn append_edit(&mut self, edit: &TxEdit) -> PersistResult<u64> {
        Ok(self.writer_mut()?.append(edit)?)
    }

    fn write_snapshot(&mut self, snapshot: &TxStateSnapshot) -> PersistResult<()> {
        let serialized = snapshot.serialize();
        let checksum = TxStateSnapshot::checksum_of(&serialized)
            .expect("serialized snapshot always carries a checksum trailer");

        let file_name = format!("txstate-{}.snap", snapshot.write_pointer.value());
        let file_path = self.snapshot_dir().join(&file_name);

        let mut file = File::create(&file_path).map_err(|e| {
            PersistenceError::snapshot_write(
                format!("Failed to create snapshot file: {}", file_path.display()),
                e,
            )
        })?;
        std::io::Write::write_all(&mut file, &serialized).map_err(|e| {
            PersistenceError::snapshot_write(
                format!("Failed to write snapshot file: {}", file_path.display()),
                e,
            )
        })?;
        file.sync_all().map_err(|e| {
            PersistenceError::snapshot_write(
                format!("Failed to fsync snapshot file: {}", file_path.display()),
                e,
            )
        })?;
        drop(file);

        let dir_handle = OpenOptions::new()
            .read(true)
            .open(self.snapshot_dir())
            .map_err(|e| {
                PersistenceError::snapshot_write(
                    "Failed to open snapshot directory for fsync".to_string(),
                    e,
                )
            })?;
        dir_handle.sync_all().map_err(|e| {
            PersistenceError::snapshot_write(
                "Failed to fsync snapshot directory".to_string(),
                e,
            )
        })?;

        let manifest =
            SnapshotManifest::new(&file_name, snapshot.write_pointer.value(), checksum);
        manifest.write_to_file(&self.manifest_path())?;

        // The snapshot is durable and authoritative; the log restarts empty.
        self.writer_mut()?.truncate()?;

        self.remove_superseded_snapshots(&file_name);
        Ok(())
    }

    fn load_latest_snapshot(&mut self) -> PersistResult<Option<TxStateSnapshot>> {
        let manifest = match SnapshotManifest::read_from_file(&self.manifest_path())? {
            Some(m) => m,
            None => return Ok(None),
        };

        let file_path = self.snapshot_dir().join(&manifest.snapshot_file);
        let data = fs::read(&file_path).map_err(|e| {
            PersistenceError::snapshot_corruption(format!(
                "Failed to read snapshot file {}: {}",
                file_path.display(),
                e
            ))
        })?;

        let stored = TxStateSnapshot::checksum_of(&data).ok_or_else(|| {
            PersistenceError::snapshot_corruption(format!(
                "Snapshot file too short: {}",
                file_path.display()
            ))
        })?;
        if stored != manifest.checksum_value()? {
            return Err(PersistenceError::snapshot_corruption(format!(
                "Snapshot checksum does not match manifest for {}",
                file_path.display()
            )));
        }

        Ok(Some(TxStateSnapshot::deserialize(&data)?))
    }

    fn replay_edits(&mut self) -> PersistResult<Vec<crate::txlog::TxLogRecord>> {
        let log_path = self.data_dir.join("txlog").join("edits.log");
        if !log_path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = TxLogReader::open(&log_path)?;
        let records = reader.read_all()?;
        self.torn_tail = reader.reached_torn_tail();
        Ok(records)
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn acquire(&mut self) -> PersistResult<()> {
        if self.writer.is_none() {
            self.writer = Some(TxLogWriter::open(&self.data_dir)?);
        }
        Ok(())
    }

    fn release(&mut self) -> PersistResult<()> {
        self.writer = None;
        Ok(())
    }
}

//! Snapshot manifest structure and serialization
//!
//! Per PERSISTENCE.md §3, `snapshots/MANIFEST.json` is the authoritative
//! snapshot descriptor:
//!
//! ```json
//! {
//!   "snapshot_file": "txstate-6000000.snap",
//!   "write_pointer": 6000000,
//!   "checksum": "crc32:deadbeef",
//!   "created_at": "2026-02-04T11:30:00Z",
//!   "format_version": 1
//! }
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{PersistResult, PersistenceError};

/// The authoritative descriptor of the latest durable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotManifest {
    /// Snapshot file name, relative to the snapshots directory.
    pub snapshot_file: String,

    /// Write pointer captured by the snapshot.
    pub write_pointer: u64,

    /// CRC32 of the snapshot file (format: "crc32:XXXXXXXX").
    pub checksum: String,

    /// Creation timestamp in RFC3339 format.
    pub created_at: String,

    /// Manifest format version (always 1).
    pub format_version: u8,
}

impl SnapshotManifest {
    pub fn new(snapshot_file: impl Into<String>, write_pointer: u64, checksum: u32) -> Self {
        Self {
            snapshot_file: snapshot_file.into(),
            write_pointer,
            checksum: format!("crc32:{:08x}", checksum),
            created_at: Utc::now().to_rfc3339(),
            format_version: 1,
        }
    }

    /// Parses the `crc32:XXXXXXXX` checksum field.
    pub fn checksum_value(&self) -> PersistResult<u32> {
        let hex = self.checksum.strip_prefix("crc32:").ok_or_else(|| {
            PersistenceError::manifest(format!("Unrecognized checksum format: {}", self.checksum))
        })?;
        u32::from_str_radix(hex, 16).map_err(|e| {
            PersistenceError::manifest(format!("Unparseable checksum {}: {}", self.checksum, e))
        })
    }

    pub fn to_json(&self) -> PersistResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PersistenceError::manifest(format!("Failed to serialize manifest: {}", e)))
    }

    pub fn from_json(json: &str) -> PersistResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PersistenceError::manifest(format!("Failed to parse manifest: {}", e)))
    }

    /// Writes the manifest durably: temporary file, fsync, rename into
    /// place, directory fsync (PERSISTENCE.md §3).
    pub fn write_to_file(&self, path: &Path) -> PersistResult<()> {
        let json = self.to_json()?;
        let dir = path.parent().ok_or_else(|| {
            PersistenceError::manifest(format!("Manifest path has no parent: {}", path.display()))
        })?;

        let tmp_path = path.with_extension("json.tmp");
        let mut tmp = File::create(&tmp_path).map_err(|e| {
            PersistenceError::manifest_io(
                format!("Failed to create manifest temp file: {}", tmp_path.display()),
                e,
            )
        })?;
        tmp.write_all(json.as_bytes()).map_err(|e| {
            PersistenceError::manifest_io(
                format!("Failed to write manifest temp file: {}", tmp_path.display()),
                e,
            )
        })?;
        tmp.sync_all().map_err(|e| {
            PersistenceError::manifest_io(
                format!("Failed to fsync manifest temp file: {}", tmp_path.display()),
                e,
            )
        })?;
        drop(tmp);

        fs::rename(&tmp_path, path).map_err(|e| {
            PersistenceError::manifest_io(
                format!("Failed to rename manifest into place: {}", path.display()),
                e,
            )
        })?;

        let dir_handle = OpenOptions::new().read(true).open(dir).map_err(|e| {
            PersistenceError::manifest_io(
                format!("Failed to open manifest directory: {}", dir.display()),
                e,
            )
        })?;
        dir_handle.sync_all().map_err(|e| {
            PersistenceError::manifest_io(
                format!("Failed to fsync manifest directory: {}", dir.display()),
                e,
            )
        })?;

        Ok(())
    }

    /// Reads a manifest, returning `None` if the file does not exist.
    pub fn read_from_file(path: &Path) -> PersistResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path).map_err(|e| {
            PersistenceError::manifest_io(
                format!("Failed to read manifest: {}", path.display()),
                e,
            )
        })?;
        Ok(Some(Self::from_json(&json)?))
    }
}

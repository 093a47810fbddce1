//! Full-state snapshot codec
//!
//! Per PERSISTENCE.md §3: a snapshot serializes everything recovery needs to
//! resume without the pre-snapshot portion of the edit log - read and write
//! pointers, in-progress entries, the invalid set, and the committed change
//! sets. Files carry an 8-byte magic and a trailing CRC32.

use std::io::{self, Cursor, Read};

use crate::txlog::checksum::compute_checksum;
use crate::txn::{TransactionType, TxId};

use super::errors::{PersistResult, PersistenceError};

/// File magic for snapshot files, format version 1.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"VTGSNAP1";

/// A persisted in-progress entry.
///
/// Carries the visibility floor (TRANSACTIONS.md §6) so pruning resumes with
/// exact bounds after recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedInProgress {
    pub id: TxId,
    pub tx_type: TransactionType,
    pub start_ms: i64,
    pub expiry_ms: i64,
    pub visibility_floor: TxId,
}

/// The complete durable registry state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxStateSnapshot {
    pub read_pointer: TxId,
    pub write_pointer: TxId,
    pub in_progress: Vec<PersistedInProgress>,
    pub invalid: Vec<TxId>,
    /// Commit id paired with the keys of its change set.
    pub committed_change_sets: Vec<(TxId, Vec<Vec<u8>>)>,
}

impl TxStateSnapshot {
    /// Serializes to the on-disk format: magic, body, trailing CRC32.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(SNAPSHOT_MAGIC);

        buf.extend_from_slice(&self.read_pointer.value().to_le_bytes());
        buf.extend_from_slice(&self.write_pointer.value().to_le_bytes());

        buf.extend_from_slice(&(self.in_progress.len() as u32).to_le_bytes());
        for entry in &self.in_progress {
            buf.extend_from_slice(&entry.id.value().to_le_bytes());
            buf.push(entry.tx_type.as_u8());
            buf.extend_from_slice(&entry.start_ms.to_le_bytes());
            buf.extend_from_slice(&entry.expiry_ms.to_le_bytes());
            buf.extend_from_slice(&entry.visibility_floor.value().to_le_bytes());
        }

        buf.extend_from_slice(&(self.invalid.len() as u32).to_le_bytes());
        for id in &self.invalid {
            buf.extend_from_slice(&id.value().to_le_bytes());
        }

        buf.extend_from_slice(&(self.committed_change_sets.len() as u32).to_le_bytes());
        for (commit_id, keys) in &self.committed_change_sets {
            buf.extend_from_slice(&commit_id.value().to_le_bytes());
            buf.extend_from_slice(&(keys.len() as u32).to_le_bytes());
            for key in keys {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
            }
        }

        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// CRC32 of a serialized snapshot, as recorded in the manifest.
    pub fn checksum_of(serialized: &[u8]) -> Option<u32> {
        if serialized.len() < 4 {
            return None;
        }
        let offset = serialized.len() - 4;
        Some(u32::from_le_bytes([
            serialized[offset],
            serialized[offset + 1],
            serialized[offset + 2],
            serialized[offset + 3],
        ]))
    }

    /// Deserializes from the on-disk format, verifying magic and CRC.
    pub fn deserialize(data: &[u8]) -> PersistResult<Self> {
        if data.len() < SNAPSHOT_MAGIC.len() + 8 + 8 + 4 + 4 + 4 + 4 {
            return Err(PersistenceError::snapshot_corruption(format!(
                "Snapshot too short: {} bytes",
                data.len()
            )));
        }

        let checksum_offset = data.len() - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if stored != computed {
            return Err(PersistenceError::snapshot_corruption(format!(
                "Checksum mismatch: computed {:08x}, stored {:08x}",
                computed, stored
            )));
        }

        if &data[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
            return Err(PersistenceError::snapshot_corruption(
                "Bad snapshot magic".to_string(),
            ));
        }

        let body = &data[SNAPSHOT_MAGIC.len()..checksum_offset];
        Self::deserialize_body(body).map_err(|e| {
            PersistenceError::snapshot_corruption(format!("Malformed snapshot body: {}", e))
        })
    }

    fn deserialize_body(body: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(body);

        let read_pointer = TxId::new(read_u64(&mut cursor)?);
        let write_pointer = TxId::new(read_u64(&mut cursor)?);

        let in_progress_count = read_u32(&mut cursor)? as usize;
        let mut in_progress = Vec::with_capacity(in_progress_count.min(4096));
        for _ in 0..in_progress_count {
            let id = TxId::new(read_u64(&mut cursor)?);
            let type_byte = read_u8(&mut cursor)?;
            let tx_type = TransactionType::from_u8(type_byte).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid transaction type: {}", type_byte),
                )
            })?;
            let start_ms = read_i64(&mut cursor)?;
            let expiry_ms = read_i64(&mut cursor)?;
            let visibility_floor = TxId::new(read_u64(&mut cursor)?);
            in_progress.push(PersistedInProgress {
                id,
                tx_type,
                start_ms,
                expiry_ms,
                visibility_floor,
            });
        }

        let invalid_count = read_u32(&mut cursor)? as usize;
        let mut invalid = Vec::with_capacity(invalid_count.min(4096));
        for _ in 0..invalid_count {
            invalid.push(TxId::new(read_u64(&mut cursor)?));
        }

        let committed_count = read_u32(&mut cursor)? as usize;
        let mut committed_change_sets = Vec::with_capacity(committed_count.min(4096));
        for _ in 0..committed_count {
            let commit_id = TxId::new(read_u64(&mut cursor)?);
            let key_count = read_u32(&mut cursor)? as usize;
            let mut keys = Vec::with_capacity(key_count.min(4096));
            for _ in 0..key_count {
                let len = read_u32(&mut cursor)? as usize;
                let mut key = vec![0u8; len];
                cursor.read_exact(&mut key)?;
                keys.push(key);
            }
            committed_change_sets.push((commit_id, keys));
        }

        if cursor.position() != body.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after snapshot body",
            ));
        }

        Ok(Self {
            read_pointer,
            write_pointer,
            in_progress,
            invalid,
            committed_change_sets,
        })
    }
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

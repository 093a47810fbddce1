//! Edit log record types and framing
//!
//! Per PERSISTENCE.md §2, each record contains:
//! - Record Length (u32 LE)
//! - Edit Kind (u8)
//! - Sequence Number (u64 LE)
//! - Payload (variable)
//! - Checksum (u32 LE)
//!
//! The payload encodes one state transition (TRANSACTIONS.md §2); the log is
//! the sequence of all durable transitions since the last snapshot.

use std::io::{self, Cursor, Read};

use crate::txn::{ChangeKey, ChangeSet, TransactionType, TxId};

/// Edit kinds per PERSISTENCE.md §2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EditKind {
    /// A transaction entered the in-progress set.
    Start = 0,
    /// A transaction committed; carries its change set and commit id.
    Commit = 1,
    /// A transaction aborted; leaves no further trace.
    Abort = 2,
    /// A transaction moved to the invalid set.
    Invalidate = 3,
    /// Administrative removal of invalid ids (TRANSACTIONS.md §2).
    TruncateInvalid = 4,
}

impl EditKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EditKind::Start),
            1 => Some(EditKind::Commit),
            2 => Some(EditKind::Abort),
            3 => Some(EditKind::Invalidate),
            4 => Some(EditKind::TruncateInvalid),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One durable state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEdit {
    Start {
        id: TxId,
        tx_type: TransactionType,
        start_ms: i64,
        expiry_ms: i64,
    },
    Commit {
        tx_id: TxId,
        commit_id: TxId,
        change_set: ChangeSet,
    },
    Abort {
        id: TxId,
    },
    Invalidate {
        id: TxId,
    },
    TruncateInvalid {
        ids: Vec<TxId>,
    },
}

impl TxEdit {
    pub fn kind(&self) -> EditKind {
        match self {
            TxEdit::Start { .. } => EditKind::Start,
            TxEdit::Commit { .. } => EditKind::Commit,
            TxEdit::Abort { .. } => EditKind::Abort,
            TxEdit::Invalidate { .. } => EditKind::Invalidate,
            TxEdit::TruncateInvalid { .. } => EditKind::TruncateInvalid,
        }
    }

    /// Serializes the payload per PERSISTENCE.md §2.
    fn serialize_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            TxEdit::Start {
                id,
                tx_type,
                start_ms,
                expiry_ms,
            } => {
                buf.extend_from_slice(&id.value().to_le_bytes());
                buf.push(tx_type.as_u8());
                buf.extend_from_slice(&start_ms.to_le_bytes());
                buf.extend_from_slice(&expiry_ms.to_le_bytes());
            }
            TxEdit::Commit {
                tx_id,
                commit_id,
                change_set,
            } => {
                buf.extend_from_slice(&tx_id.value().to_le_bytes());
                buf.extend_from_slice(&commit_id.value().to_le_bytes());
                buf.extend_from_slice(&(change_set.len() as u32).to_le_bytes());
                for key in change_set.iter() {
                    buf.extend_from_slice(&(key.as_bytes().len() as u32).to_le_bytes());
                    buf.extend_from_slice(key.as_bytes());
                }
            }
            TxEdit::Abort { id } | TxEdit::Invalidate { id } => {
                buf.extend_from_slice(&id.value().to_le_bytes());
            }
            TxEdit::TruncateInvalid { ids } => {
                buf.extend_from_slice(&(ids.len() as u32).to_le_bytes());
                for id in ids {
                    buf.extend_from_slice(&id.value().to_le_bytes());
                }
            }
        }
        buf
    }

    /// Deserializes a payload for the given kind.
    fn deserialize_payload(kind: EditKind, data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        let edit = match kind {
            EditKind::Start => {
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
                TxEdit::Start {
                    id,
                    tx_type,
                    start_ms,
                    expiry_ms,
                }
            }
            EditKind::Commit => {
                let tx_id = TxId::new(read_u64(&mut cursor)?);
                let commit_id = TxId::new(read_u64(&mut cursor)?);
                let key_count = read_u32(&mut cursor)? as usize;
                let mut change_set = ChangeSet::new();
                for _ in 0..key_count {
                    let len = read_u32(&mut cursor)? as usize;
                    let mut key = vec![0u8; len];
                    cursor.read_exact(&mut key)?;
                    change_set.insert(ChangeKey::new(key));
                }
                TxEdit::Commit {
                    tx_id,
                    commit_id,
                    change_set,
                }
            }
            EditKind::Abort => TxEdit::Abort {
                id: TxId::new(read_u64(&mut cursor)?),
            },
            EditKind::Invalidate => TxEdit::Invalidate {
                id: TxId::new(read_u64(&mut cursor)?),
            },
            EditKind::TruncateInvalid => {
                let count = read_u32(&mut cursor)? as usize;
                let mut ids = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    ids.push(TxId::new(read_u64(&mut cursor)?));
                }
                TxEdit::TruncateInvalid { ids }
            }
        };
        Ok(edit)
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

/// A framed edit log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLogRecord {
    /// Global monotonic record number (starts at 1, never reused within a
    /// log generation).
    pub sequence: u64,
    /// The state transition.
    pub edit: TxEdit,
}

/// Minimum framed size: length + kind + sequence + checksum.
pub const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 4;

impl TxLogRecord {
    pub fn new(sequence: u64, edit: TxEdit) -> Self {
        Self { sequence, edit }
    }

    /// Serializes the record body (everything except the length prefix and
    /// checksum). This is part of the data the checksum covers.
    fn serialize_body(&self) -> Vec<u8> {
        let payload = self.edit.serialize_payload();
        let mut buf = Vec::with_capacity(1 + 8 + payload.len());
        buf.push(self.edit.kind().as_u8());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf
    }

    /// Serializes the complete record per PERSISTENCE.md §2.
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let record_length = (4 + body.len() + 4) as u32;

        // Checksum covers the length field and the body.
        let mut checksum_data = Vec::with_capacity(4 + body.len());
        checksum_data.extend_from_slice(&record_length.to_le_bytes());
        checksum_data.extend_from_slice(&body);
        let checksum = crate::txlog::checksum::compute_checksum(&checksum_data);

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Deserializes a record, verifying the checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum =
            crate::txlog::checksum::compute_checksum(&data[0..checksum_offset]);
        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let kind_byte = data[4];
        let kind = EditKind::from_u8(kind_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid edit kind: {}", kind_byte),
            )
        })?;

        let sequence = u64::from_le_bytes([
            data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
        ]);

        let edit = TxEdit::deserialize_payload(kind, &data[13..checksum_offset])?;

        Ok((TxLogRecord { sequence, edit }, record_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_change_set() -> ChangeSet {
        ["users:1", "users:2", "orders:17"]
            .iter()
            .map(|k| ChangeKey::from(*k))
            .collect()
    }

    fn sample_edits() -> Vec<TxEdit> {
        vec![
            TxEdit::Start {
                id: TxId::new(1_000_000),
                tx_type: TransactionType::Short,
                start_ms: 1,
                expiry_ms: 30_001,
            },
            TxEdit::Start {
                id: TxId::new(2_000_000),
                tx_type: TransactionType::Long,
                start_ms: 2,
                expiry_ms: 86_400_002,
            },
            TxEdit::Commit {
                tx_id: TxId::new(1_000_000),
                commit_id: TxId::new(3_000_000),
                change_set: sample_change_set(),
            },
            TxEdit::Abort {
                id: TxId::new(2_000_000),
            },
            TxEdit::Invalidate {
                id: TxId::new(4_000_000),
            },
            TxEdit::TruncateInvalid {
                ids: vec![TxId::new(4_000_000), TxId::new(5_000_000)],
            },
        ]
    }

    #[test]
    fn test_edit_kind_round_trip() {
        for kind in [
            EditKind::Start,
            EditKind::Commit,
            EditKind::Abort,
            EditKind::Invalidate,
            EditKind::TruncateInvalid,
        ] {
            assert_eq!(EditKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(EditKind::from_u8(5), None);
        assert_eq!(EditKind::from_u8(255), None);
    }

    #[test]
    fn test_record_round_trip_all_kinds() {
        for (i, edit) in sample_edits().into_iter().enumerate() {
            let record = TxLogRecord::new(i as u64 + 1, edit);
            let serialized = record.serialize();
            let (deserialized, consumed) = TxLogRecord::deserialize(&serialized).unwrap();
            assert_eq!(record, deserialized);
            assert_eq!(consumed, serialized.len());
        }
    }

    #[test]
    fn test_commit_preserves_change_set_contents() {
        let record = TxLogRecord::new(
            7,
            TxEdit::Commit {
                tx_id: TxId::new(10),
                commit_id: TxId::new(20),
                change_set: sample_change_set(),
            },
        );
        let serialized = record.serialize();
        let (deserialized, _) = TxLogRecord::deserialize(&serialized).unwrap();
        match deserialized.edit {
            TxEdit::Commit { change_set, .. } => {
                assert_eq!(change_set, sample_change_set());
            }
            other => panic!("Expected commit edit, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_change_set_round_trips() {
        let record = TxLogRecord::new(
            1,
            TxEdit::Commit {
                tx_id: TxId::new(10),
                commit_id: TxId::new(20),
                change_set: ChangeSet::new(),
            },
        );
        let (deserialized, _) = TxLogRecord::deserialize(&record.serialize()).unwrap();
        assert_eq!(record, deserialized);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let record = TxLogRecord::new(1, sample_edits().remove(2));
        let mut serialized = record.serialize();
        let mid = serialized.len() / 2;
        serialized[mid] ^= 0xFF;

        let err = TxLogRecord::deserialize(&serialized).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_record_detected() {
        let record = TxLogRecord::new(1, sample_edits().remove(0));
        let serialized = record.serialize();
        let truncated = &serialized[0..serialized.len() - 5];
        assert!(TxLogRecord::deserialize(truncated).is_err());
    }

    #[test]
    fn test_deterministic_serialization() {
        let record = TxLogRecord::new(1, sample_edits().remove(2));
        assert_eq!(record.serialize(), record.serialize());
    }

    #[test]
    fn test_sequence_number_preserved() {
        let record = TxLogRecord::new(42, sample_edits().remove(4));
        let (deserialized, _) = TxLogRecord::deserialize(&record.serialize()).unwrap();
        assert_eq!(deserialized.sequence, 42);
    }
}

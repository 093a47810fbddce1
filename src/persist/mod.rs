//! Durable transaction state
//!
//! Per PERSISTENCE.md: a write-ahead edit log plus periodic full-state
//! snapshots. The `TxStatePersistence` trait is what the manager holds;
//! implementations:
//!
//! - [`DiskPersistence`] - fsync-on-append log, CRC-checked snapshot files,
//!   JSON manifest (production)
//! - [`NoopPersistence`] - accepts everything, stores nothing; state is lost
//!   on restart (ephemeral/test use only, PERSISTENCE.md §6)

mod disk;
mod errors;
mod manifest;
mod snapshot;

pub use disk::DiskPersistence;
pub use errors::{PersistResult, PersistenceError};
pub use manifest::SnapshotManifest;
pub use snapshot::{PersistedInProgress, TxStateSnapshot, SNAPSHOT_MAGIC};

use crate::txlog::{TxEdit, TxLogRecord};

/// Durable storage for registry state transitions and snapshots.
///
/// Mutating calls happen inside the manager's critical section
/// (TRANSACTIONS.md §7); implementations do not need their own locking.
pub trait TxStatePersistence: Send {
    /// Durably records one state transition, returning its sequence number.
    ///
    /// Per PERSISTENCE.md §1 this must complete before the transition is
    /// acknowledged to the caller.
    fn append_edit(&mut self, edit: &TxEdit) -> PersistResult<u64>;

    /// Writes a full-state snapshot, switches the manifest, and truncates
    /// the edit log.
    fn write_snapshot(&mut self, snapshot: &TxStateSnapshot) -> PersistResult<()>;

    /// Loads the snapshot the manifest points at, if any.
    fn load_latest_snapshot(&mut self) -> PersistResult<Option<TxStateSnapshot>>;

    /// Reads all edit records appended after the latest snapshot.
    fn replay_edits(&mut self) -> PersistResult<Vec<TxLogRecord>>;

    /// Whether state survives a restart.
    fn is_durable(&self) -> bool;

    /// Re-acquires file handles before serving (counterpart of `release`,
    /// called by `become_active`).
    fn acquire(&mut self) -> PersistResult<()>;

    /// Releases file handles for standby (PERSISTENCE.md §1: exactly one
    /// instance holds the log).
    fn release(&mut self) -> PersistResult<()>;
}

/// Persistence that accepts everything and stores nothing.
#[derive(Debug, Default)]
pub struct NoopPersistence {
    next_sequence: u64,
}

impl NoopPersistence {
    pub fn new() -> Self {
        Self { next_sequence: 1 }
    }
}

impl TxStatePersistence for NoopPersistence {
    fn append_edit(&mut self, _edit: &TxEdit) -> PersistResult<u64> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Ok(sequence)
    }

    fn write_snapshot(&mut self, _snapshot: &TxStateSnapshot) -> PersistResult<()> {
        Ok(())
    }

    fn load_latest_snapshot(&mut self) -> PersistResult<Option<TxStateSnapshot>> {
        Ok(None)
    }

    fn replay_edits(&mut self) -> PersistResult<Vec<TxLogRecord>> {
        Ok(Vec::new())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn acquire(&mut self) -> PersistResult<()> {
        Ok(())
    }

    fn release(&mut self) -> PersistResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::txn::{TransactionType, TxId};

    use super::*;

    #[test]
    fn test_noop_assigns_sequences_without_storing() {
        let mut persistence = NoopPersistence::new();
        let edit = TxEdit::Start {
            id: TxId::new(1_000_000),
            tx_type: TransactionType::Short,
            start_ms: 1,
            expiry_ms: 30_001,
        };

        assert_eq!(persistence.append_edit(&edit).unwrap(), 1);
        assert_eq!(persistence.append_edit(&edit).unwrap(), 2);

        assert!(!persistence.is_durable());
        assert!(persistence.load_latest_snapshot().unwrap().is_none());
        assert!(persistence.replay_edits().unwrap().is_empty());
    }
}

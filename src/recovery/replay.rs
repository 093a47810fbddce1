//! Edit log replay onto the registry state machine
//!
//! Per PERSISTENCE.md §5:
//! - Records replayed strictly in sequence order
//! - Every start id and commit id must exceed the write pointer at that
//!   point of replay (ids are never reassigned during recovery)
//! - Commit/abort/invalidate must reference an id in progress at that point
//! - Any violation is fatal

use crate::manager::RegistryState;
use crate::txlog::{TxEdit, TxLogRecord};

use super::errors::{RecoveryError, RecoveryResult};

/// Statistics from one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub records_replayed: u64,
    pub starts: u64,
    pub commits: u64,
    pub aborts: u64,
    pub invalidations: u64,
    pub truncations: u64,
    pub final_sequence: u64,
}

/// Applies one edit, enforcing the replay rules.
pub fn apply_edit(registry: &mut RegistryState, edit: &TxEdit) -> RecoveryResult<()> {
    match edit {
        TxEdit::Start {
            id,
            tx_type,
            start_ms,
            expiry_ms,
        } => {
            if *id <= registry.write_pointer() {
                return Err(RecoveryError::replay(format!(
                    "Start id {} not above write pointer {}",
                    id,
                    registry.write_pointer()
                )));
            }
            registry.replay_start(*id, *tx_type, *start_ms, *expiry_ms);
        }
        TxEdit::Commit {
            tx_id,
            commit_id,
            change_set,
        } => {
            if !registry.is_in_progress(*tx_id) {
                return Err(RecoveryError::replay(format!(
                    "Commit references transaction {} which is not in progress",
                    tx_id
                )));
            }
            if *commit_id <= registry.write_pointer() {
                return Err(RecoveryError::replay(format!(
                    "Commit id {} not above write pointer {}",
                    commit_id,
                    registry.write_pointer()
                )));
            }
            registry.apply_commit(*tx_id, *commit_id, change_set.clone());
        }
        TxEdit::Abort { id } => {
            if !registry.is_in_progress(*id) {
                return Err(RecoveryError::replay(format!(
                    "Abort references transaction {} which is not in progress",
                    id
                )));
            }
            registry.abort(*id);
        }
        TxEdit::Invalidate { id } => {
            if !registry.is_in_progress(*id) {
                return Err(RecoveryError::replay(format!(
                    "Invalidate references transaction {} which is not in progress",
                    id
                )));
            }
            registry.invalidate(*id);
        }
        TxEdit::TruncateInvalid { ids } => {
            // Lenient: the ids may already have been pruned before the
            // truncation was logged on a previous incarnation.
            registry.truncate_invalid(ids);
        }
    }
    Ok(())
}

/// Replays a full record sequence onto the registry.
pub fn replay(registry: &mut RegistryState, records: &[TxLogRecord]) -> RecoveryResult<ReplayStats> {
    let mut stats = ReplayStats::default();
    let mut last_sequence = 0u64;

    for record in records {
        if record.sequence <= last_sequence {
            return Err(RecoveryError::replay(format!(
                "Record sequence {} not above previous {}",
                record.sequence, last_sequence
            )));
        }
        last_sequence = record.sequence;

        apply_edit(registry, &record.edit)?;

        stats.records_replayed += 1;
        stats.final_sequence = record.sequence;
        match record.edit {
            TxEdit::Start { .. } => stats.starts += 1,
            TxEdit::Commit { .. } => stats.commits += 1,
            TxEdit::Abort { .. } => stats.aborts += 1,
            TxEdit::Invalidate { .. } => stats.invalidations += 1,
            TxEdit::TruncateInvalid { .. } => stats.truncations += 1,
        }
    }

    Ok(stats)
}

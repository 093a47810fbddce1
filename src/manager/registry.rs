//! TransactionRegistry - the in-memory transaction state machine
//!
//! Per TRANSACTIONS.md §2/§3: the in-progress set, staged change sets,
//! committed change sets, the invalid set, and the read/write pointers.
//!
//! The state machine is pure: every transition takes explicit ids and
//! timestamps, so behavior is deterministic and directly testable. Locking,
//! id allocation, wall-clock access, and durable logging belong to the
//! manager (TRANSACTIONS.md §7); replay drives the same transitions during
//! recovery (PERSISTENCE.md §5).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::persist::{PersistedInProgress, TxStateSnapshot};
use crate::txn::{ChangeKey, ChangeSet, Transaction, TransactionType, TxId, VisibilitySnapshot};

use super::conflict::ConflictDetector;
use super::errors::{TransactionError, TxResult};

/// A tracked in-progress transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InProgressEntry {
    pub start_ms: i64,
    pub expiry_ms: i64,
    pub tx_type: TransactionType,
    /// Lowest id this transaction can still reference: the minimum of the
    /// read pointer at start and its smallest excluded id
    /// (TRANSACTIONS.md §6).
    pub visibility_floor: TxId,
}

/// A change set staged by `canCommit`, awaiting `commit`.
#[derive(Debug, Clone)]
struct StagedEntry {
    change_set: ChangeSet,
    deadline_ms: i64,
}

/// Counts removed by one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub committed_removed: usize,
    pub invalid_removed: usize,
}

/// The authoritative transaction state.
#[derive(Debug, Default)]
pub struct RegistryState {
    read_pointer: TxId,
    write_pointer: TxId,
    in_progress: BTreeMap<TxId, InProgressEntry>,
    staged: HashMap<TxId, StagedEntry>,
    committed_change_sets: BTreeMap<TxId, ChangeSet>,
    invalid: BTreeSet<TxId>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- accessors ---------------------------------------------------------

    pub fn read_pointer(&self) -> TxId {
        self.read_pointer
    }

    pub fn write_pointer(&self) -> TxId {
        self.write_pointer
    }

    pub fn is_in_progress(&self, id: TxId) -> bool {
        self.in_progress.contains_key(&id)
    }

    pub fn is_invalid(&self, id: TxId) -> bool {
        self.invalid.contains(&id)
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid.len()
    }

    pub fn committed_change_set_count(&self) -> usize {
        self.committed_change_sets.len()
    }

    // --- transitions -------------------------------------------------------

    /// Records a newly started transaction and returns the client handle.
    ///
    /// The id was allocated by the caller's clock and must exceed every id
    /// seen so far. The returned transaction carries the visibility snapshot
    /// frozen before the insert (TRANSACTIONS.md §3): the new transaction is
    /// not in its own excluded set (its own writes are visible to it).
    pub fn begin(
        &mut self,
        id: TxId,
        tx_type: TransactionType,
        now_ms: i64,
        timeout_ms: i64,
    ) -> Transaction {
        debug_assert!(id > self.write_pointer, "transaction ids must be fresh");
        let snapshot = self.visibility_snapshot();
        self.insert_in_progress(id, tx_type, now_ms, now_ms + timeout_ms);
        Transaction::new(id, tx_type, snapshot)
    }

    /// Inserts an in-progress entry, computing its visibility floor from the
    /// pre-insert state. Shared by `begin` and recovery replay.
    pub fn replay_start(
        &mut self,
        id: TxId,
        tx_type: TransactionType,
        start_ms: i64,
        expiry_ms: i64,
    ) {
        self.insert_in_progress(id, tx_type, start_ms, expiry_ms);
    }

    fn insert_in_progress(&mut self, id: TxId, tx_type: TransactionType, start_ms: i64, expiry_ms: i64) {
        let visibility_floor = self
            .in_progress
            .keys()
            .next()
            .copied()
            .unwrap_or(id)
            .min(self.read_pointer);
        self.in_progress.insert(
            id,
            InProgressEntry {
                start_ms,
                expiry_ms,
                tx_type,
                visibility_floor,
            },
        );
        self.write_pointer = self.write_pointer.max(id);
    }

    /// Conflict-checks a candidate change set and stages it for commit.
    ///
    /// Per TRANSACTIONS.md §4 the check covers change sets committed after
    /// the transaction's read pointer and sets staged by other transactions.
    /// Committed state is not mutated; the stage lapses after `grace_ms`
    /// (TRANSACTIONS.md §5).
    pub fn check_and_stage(
        &mut self,
        tx: &Transaction,
        change_set: ChangeSet,
        now_ms: i64,
        grace_ms: i64,
    ) -> TxResult<()> {
        if !self.in_progress.contains_key(&tx.id()) {
            return Err(TransactionError::NotInProgress(tx.id()));
        }

        let tx_id = tx.id();
        let staged_others = self
            .staged
            .iter()
            .filter(move |(id, _)| **id != tx_id)
            .map(|(_, entry)| &entry.change_set);
        if let Some(key) = ConflictDetector::first_conflict(
            tx.read_pointer(),
            &change_set,
            &self.committed_change_sets,
            staged_others,
        ) {
            return Err(TransactionError::Conflict { tx_id, key });
        }

        self.staged.insert(
            tx_id,
            StagedEntry {
                change_set,
                deadline_ms: now_ms + grace_ms,
            },
        );
        Ok(())
    }

    /// Returns the staged change set for a commit, validating liveness.
    ///
    /// A lapsed stage is dropped here (the transaction reverts to plain
    /// in-progress) and reported as `CommitGraceExpired`.
    pub fn staged_change_set(&mut self, tx_id: TxId, now_ms: i64) -> TxResult<ChangeSet> {
        if !self.in_progress.contains_key(&tx_id) {
            return Err(TransactionError::NotInProgress(tx_id));
        }
        match self.staged.get(&tx_id) {
            None => Err(TransactionError::CommitGraceExpired(tx_id)),
            Some(entry) if entry.deadline_ms <= now_ms => {
                self.staged.remove(&tx_id);
                Err(TransactionError::CommitGraceExpired(tx_id))
            }
            Some(entry) => Ok(entry.change_set.clone()),
        }
    }

    /// Finalizes a commit under a freshly allocated commit id.
    ///
    /// Per TRANSACTIONS.md §3: the change set (if non-empty) is recorded
    /// under the commit id, the in-progress entry is removed, and both
    /// pointers advance to the commit id. Shared by the manager and replay.
    pub fn apply_commit(&mut self, tx_id: TxId, commit_id: TxId, change_set: ChangeSet) {
        self.in_progress.remove(&tx_id);
        self.staged.remove(&tx_id);
        if !change_set.is_empty() {
            self.committed_change_sets.insert(commit_id, change_set);
        }
        self.write_pointer = self.write_pointer.max(commit_id);
        self.read_pointer = self.read_pointer.max(commit_id);
    }

    /// Removes an in-progress entry and its stage. Returns whether anything
    /// was removed; aborting an unknown id is a no-op (TRANSACTIONS.md §2).
    pub fn abort(&mut self, id: TxId) -> bool {
        let removed = self.in_progress.remove(&id).is_some();
        self.staged.remove(&id);
        removed
    }

    /// Moves an in-progress id to the invalid set.
    ///
    /// Returns false if the id is not in progress (already finished).
    pub fn invalidate(&mut self, id: TxId) -> bool {
        if self.in_progress.remove(&id).is_none() {
            return false;
        }
        self.staged.remove(&id);
        self.invalid.insert(id);
        true
    }

    /// In-progress ids whose expiry has passed. The caller logs an
    /// invalidation edit for each before applying `invalidate`.
    pub fn expired_ids(&self, now_ms: i64) -> Vec<TxId> {
        self.in_progress
            .iter()
            .filter(|(_, entry)| entry.expiry_ms <= now_ms)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drops stages whose commit-grace deadline passed, reverting those
    /// transactions to plain in-progress (TRANSACTIONS.md §5).
    pub fn revert_lapsed_stages(&mut self, now_ms: i64) -> Vec<TxId> {
        let lapsed: Vec<TxId> = self
            .staged
            .iter()
            .filter(|(_, entry)| entry.deadline_ms <= now_ms)
            .map(|(id, _)| *id)
            .collect();
        for id in &lapsed {
            self.staged.remove(id);
        }
        lapsed
    }

    /// Administrative removal of invalid ids whose storage-side debris has
    /// been confirmed cleaned. Returns how many were present.
    pub fn truncate_invalid(&mut self, ids: &[TxId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.invalid.remove(id) {
                removed += 1;
            }
        }
        removed
    }

    // --- pruning -----------------------------------------------------------

    /// The id below which no live transaction (nor any future reader within
    /// the maximum transaction duration) can reference history.
    ///
    /// Per TRANSACTIONS.md §6: the minimum of all live visibility floors,
    /// capped by `now - long_timeout` converted to id units.
    pub fn prune_horizon(&self, now_ms: i64, long_timeout_ms: i64) -> TxId {
        let age_cap = TxId::first_in_millis(now_ms.saturating_sub(long_timeout_ms));
        self.in_progress
            .values()
            .map(|entry| entry.visibility_floor)
            .min()
            .map_or(age_cap, |floor| floor.min(age_cap))
    }

    /// Removes committed change sets and invalid ids strictly below the
    /// horizon.
    pub fn prune(&mut self, horizon: TxId) -> PruneStats {
        let committed_before = self.committed_change_sets.len();
        self.committed_change_sets = self.committed_change_sets.split_off(&horizon);
        let invalid_before = self.invalid.len();
        self.invalid = self.invalid.split_off(&horizon);
        PruneStats {
            committed_removed: committed_before - self.committed_change_sets.len(),
            invalid_removed: invalid_before - self.invalid.len(),
        }
    }

    // --- projections -------------------------------------------------------

    /// The reader-facing snapshot of the current state, taken at one
    /// consistent instant (TRANSACTIONS.md §3).
    pub fn visibility_snapshot(&self) -> VisibilitySnapshot {
        VisibilitySnapshot::new(
            self.read_pointer,
            self.in_progress.keys().copied().collect(),
            self.invalid.clone(),
        )
    }

    /// The full durable state for a persistence snapshot.
    ///
    /// Stages are deliberately absent: a crash between `canCommit` and
    /// `commit` loses only the stage (PERSISTENCE.md §1).
    pub fn state_snapshot(&self) -> TxStateSnapshot {
        TxStateSnapshot {
            read_pointer: self.read_pointer,
            write_pointer: self.write_pointer,
            in_progress: self
                .in_progress
                .iter()
                .map(|(id, entry)| PersistedInProgress {
                    id: *id,
                    tx_type: entry.tx_type,
                    start_ms: entry.start_ms,
                    expiry_ms: entry.expiry_ms,
                    visibility_floor: entry.visibility_floor,
                })
                .collect(),
            invalid: self.invalid.iter().copied().collect(),
            committed_change_sets: self
                .committed_change_sets
                .iter()
                .map(|(id, change_set)| {
                    (
                        *id,
                        change_set.iter().map(|key| key.as_bytes().to_vec()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Rebuilds registry state from a persisted snapshot.
    pub fn restore(snapshot: &TxStateSnapshot) -> Self {
        Self {
            read_pointer: snapshot.read_pointer,
            write_pointer: snapshot.write_pointer,
            in_progress: snapshot
                .in_progress
                .iter()
                .map(|entry| {
                    (
                        entry.id,
                        InProgressEntry {
                            start_ms: entry.start_ms,
                            expiry_ms: entry.expiry_ms,
                            tx_type: entry.tx_type,
                            visibility_floor: entry.visibility_floor,
                        },
                    )
                })
                .collect(),
            staged: HashMap::new(),
            committed_change_sets: snapshot
                .committed_change_sets
                .iter()
                .map(|(id, keys)| {
                    (
                        *id,
                        keys.iter().map(|key| ChangeKey::new(key.clone())).collect(),
                    )
                })
                .collect(),
            invalid: snapshot.invalid.iter().copied().collect(),
        }
    }
}

//! Write-write conflict detection
//!
//! Per TRANSACTIONS.md §4: pure set-overlap, no value comparison, no merge.
//! A candidate change set conflicts with anything committed after the
//! transaction's read pointer and with anything staged by a concurrent
//! committer. Writes are unguarded at write time; this check at commit time
//! is the whole of the concurrency control.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::txn::{ChangeKey, ChangeSet, TxId};

/// Stateless overlap check over the committed history.
pub struct ConflictDetector;

impl ConflictDetector {
    /// First conflicting key, or `None` if the candidate set is clear.
    ///
    /// Scans committed change sets with commit id strictly greater than
    /// `read_pointer` (everything at or below was visible to the
    /// transaction's snapshot and cannot conflict), then the staged sets of
    /// concurrent committers.
    pub fn first_conflict<'a>(
        read_pointer: TxId,
        candidate: &ChangeSet,
        committed: &BTreeMap<TxId, ChangeSet>,
        staged_others: impl Iterator<Item = &'a ChangeSet>,
    ) -> Option<ChangeKey> {
        if candidate.is_empty() {
            return None;
        }

        for (_, committed_set) in
            committed.range((Bound::Excluded(read_pointer), Bound::Unbounded))
        {
            if let Some(key) = candidate.first_overlap(committed_set) {
                return Some(key.clone());
            }
        }

        for staged_set in staged_others {
            if let Some(key) = candidate.first_overlap(staged_set) {
                return Some(key.clone());
            }
        }

        None
    }
}

//! VisibilitySnapshot - the minimal state a reader needs
//!
//! Per TRANSACTIONS.md §3:
//! - Frozen at a single consistent instant
//! - Carries the read pointer, the excluded set, and the invalid set
//! - Immutable once created; the registry republishes a fresh snapshot on
//!   every state change instead of letting readers lock shared state

use std::collections::BTreeSet;

use super::id::TxId;

/// A reader's frozen view of transaction state.
///
/// Per TRANSACTIONS.md §3 a writer id is visible iff it is at or below the
/// read pointer and in neither the excluded nor the invalid set. The
/// own-write exception lives on [`Transaction`](super::Transaction) and the
/// visibility filter, which know the reader's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilitySnapshot {
    read_pointer: TxId,
    excluded: BTreeSet<TxId>,
    invalid: BTreeSet<TxId>,
}

impl VisibilitySnapshot {
    pub fn new(read_pointer: TxId, excluded: BTreeSet<TxId>, invalid: BTreeSet<TxId>) -> Self {
        Self {
            read_pointer,
            excluded,
            invalid,
        }
    }

    /// Highest commit id guaranteed visible to this snapshot.
    #[inline]
    pub fn read_pointer(&self) -> TxId {
        self.read_pointer
    }

    /// Ids in progress when the snapshot was taken; invisible even if they
    /// later commit.
    pub fn excluded(&self) -> &BTreeSet<TxId> {
        &self.excluded
    }

    /// Ids whose writes must never be treated as committed.
    pub fn invalid(&self) -> &BTreeSet<TxId> {
        &self.invalid
    }

    #[inline]
    pub fn is_excluded(&self, id: TxId) -> bool {
        self.excluded.contains(&id)
    }

    #[inline]
    pub fn is_invalid(&self, id: TxId) -> bool {
        self.invalid.contains(&id)
    }

    /// Whether a writer id is visible to this snapshot.
    ///
    /// Does not apply the own-write exception; see TRANSACTIONS.md §3.
    pub fn is_visible(&self, id: TxId) -> bool {
        id <= self.read_pointer && !self.is_excluded(id) && !self.is_invalid(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u64]) -> BTreeSet<TxId> {
        values.iter().copied().map(TxId::new).collect()
    }

    fn snapshot() -> VisibilitySnapshot {
        // Committed {1, 2, 5}, invalid {4}, in progress {3, 6}.
        VisibilitySnapshot::new(TxId::new(5), ids(&[3, 6]), ids(&[4]))
    }

    #[test]
    fn test_committed_below_pointer_is_visible() {
        let snap = snapshot();
        assert!(snap.is_visible(TxId::new(1)));
        assert!(snap.is_visible(TxId::new(2)));
        assert!(snap.is_visible(TxId::new(5)));
    }

    #[test]
    fn test_excluded_is_invisible_even_below_pointer() {
        let snap = snapshot();
        assert!(!snap.is_visible(TxId::new(3)));
    }

    #[test]
    fn test_invalid_is_invisible() {
        let snap = snapshot();
        assert!(!snap.is_visible(TxId::new(4)));
        assert!(snap.is_invalid(TxId::new(4)));
    }

    #[test]
    fn test_above_read_pointer_is_invisible() {
        let snap = snapshot();
        assert!(!snap.is_visible(TxId::new(6)));
        assert!(!snap.is_visible(TxId::new(7)));
    }

    #[test]
    fn test_snapshot_equality_is_structural() {
        assert_eq!(snapshot(), snapshot());
        let other = VisibilitySnapshot::new(TxId::new(6), ids(&[3]), ids(&[4]));
        assert_ne!(snapshot(), other);
    }
}

//! Per-version visibility filtering
//!
//! Per VISIBILITY.md §1: a stateless decision procedure applied to each
//! stored version of a cell, evaluated newest-first by the caller. Embeds
//! the column TTL rule (§2) and the pluggable cell-predicate combination
//! policy (§3) consumed by storage-engine scan adapters.

use std::collections::HashMap;
use std::sync::Arc;

use crate::txn::{write_id_millis, Transaction, TxId, VisibilitySnapshot};

/// Verdict for one stored version of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Keep this version and keep scanning the column.
    Include,
    /// Keep this version; no older version can matter.
    IncludeAndStopColumn,
    /// Drop this version, continue to the next older one.
    SkipVersion,
    /// Drop this version and everything older in the column.
    StopColumn,
}

impl FilterVerdict {
    /// Whether the verdict keeps the version.
    pub fn is_include(&self) -> bool {
        matches!(
            self,
            FilterVerdict::Include | FilterVerdict::IncludeAndStopColumn
        )
    }
}

/// One stored version of a cell as seen by the scan adapter.
///
/// `write_id` is either a transaction id or a raw millisecond timestamp for
/// data written before transactional writes began (TRANSACTIONS.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredVersion<'a> {
    pub column: &'a str,
    pub write_id: u64,
}

impl<'a> StoredVersion<'a> {
    pub fn new(column: &'a str, write_id: u64) -> Self {
        Self { column, write_id }
    }
}

/// An externally supplied per-cell predicate (VISIBILITY.md §3).
pub trait CellPredicate: Send + Sync {
    fn decide(&self, version: &StoredVersion<'_>) -> FilterVerdict;
}

impl<F> CellPredicate for F
where
    F: Fn(&StoredVersion<'_>) -> FilterVerdict + Send + Sync,
{
    fn decide(&self, version: &StoredVersion<'_>) -> FilterVerdict {
        self(version)
    }
}

/// How a predicate verdict combines with the transactional verdict.
///
/// Called only when the transactional verdict is include-ish; arguments are
/// (transactional verdict, predicate verdict).
pub type CombinePolicy = fn(FilterVerdict, FilterVerdict) -> FilterVerdict;

/// The default combination policy per VISIBILITY.md §3.
pub fn default_combine(tx_verdict: FilterVerdict, predicate_verdict: FilterVerdict) -> FilterVerdict {
    match predicate_verdict {
        FilterVerdict::Include => tx_verdict,
        FilterVerdict::IncludeAndStopColumn => FilterVerdict::IncludeAndStopColumn,
        FilterVerdict::SkipVersion => {
            if tx_verdict == FilterVerdict::IncludeAndStopColumn {
                // The one visible version was rejected; nothing older helps.
                FilterVerdict::StopColumn
            } else {
                FilterVerdict::SkipVersion
            }
        }
        FilterVerdict::StopColumn => FilterVerdict::StopColumn,
    }
}

/// Stateless per-version visibility filter.
///
/// Holds no mutable state; one filter may serve any number of concurrent
/// scans against the same snapshot.
pub struct VisibilityFilter {
    snapshot: Arc<VisibilitySnapshot>,
    reader_id: Option<TxId>,
    /// TTL per column in milliseconds; zero or absent means no expiry.
    ttl_by_column: HashMap<String, i64>,
    predicate: Option<Box<dyn CellPredicate>>,
    combine: CombinePolicy,
}

impl VisibilityFilter {
    /// A filter over a bare snapshot (no reader transaction).
    pub fn new(snapshot: Arc<VisibilitySnapshot>, ttl_by_column: HashMap<String, i64>) -> Self {
        Self {
            snapshot,
            reader_id: None,
            ttl_by_column,
            predicate: None,
            combine: default_combine,
        }
    }

    /// A filter for a reader transaction: its frozen snapshot plus the
    /// own-write exception for its id.
    pub fn for_transaction(tx: &Transaction, ttl_by_column: HashMap<String, i64>) -> Self {
        Self {
            snapshot: Arc::new(tx.snapshot().clone()),
            reader_id: Some(tx.id()),
            ttl_by_column,
            predicate: None,
            combine: default_combine,
        }
    }

    /// Attaches a storage-adapter cell predicate (VISIBILITY.md §3).
    pub fn with_predicate(mut self, predicate: Box<dyn CellPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Replaces the verdict combination policy (VISIBILITY.md §3).
    pub fn with_combine_policy(mut self, combine: CombinePolicy) -> Self {
        self.combine = combine;
        self
    }

    /// Decides the fate of one stored version, per VISIBILITY.md §1.
    pub fn decide(&self, version: &StoredVersion<'_>) -> FilterVerdict {
        // Rule 1: column TTL. Compared in milliseconds so raw and
        // transactional timestamps share one cutoff (VISIBILITY.md §2).
        if let Some(&ttl_ms) = self.ttl_by_column.get(version.column) {
            if ttl_ms > 0 {
                let cutoff_ms = self.snapshot.read_pointer().epoch_millis() - ttl_ms;
                if write_id_millis(version.write_id) < cutoff_ms {
                    return FilterVerdict::StopColumn;
                }
            }
        }

        let writer = TxId::new(version.write_id);
        let tx_verdict = if self.snapshot.is_invalid(writer) {
            // Rule 2: invalid writer. Skipped, not stopped: an older valid
            // version may still be visible.
            FilterVerdict::SkipVersion
        } else if self.reader_id == Some(writer) {
            // Rule 4 own-write exception.
            FilterVerdict::IncludeAndStopColumn
        } else if !self.snapshot.is_visible(writer) {
            // Rule 3: above the read pointer or excluded.
            FilterVerdict::SkipVersion
        } else {
            // Rule 4: the one version to return for this column.
            FilterVerdict::IncludeAndStopColumn
        };

        // The predicate only sees versions the transactional rules kept
        // (VISIBILITY.md §3).
        if tx_verdict.is_include() {
            if let Some(predicate) = &self.predicate {
                return (self.combine)(tx_verdict, predicate.decide(version));
            }
        }
        tx_verdict
    }
}

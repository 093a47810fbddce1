//! Read-side filtering tests
//!
//! Drives the manager through a mixed transaction history and checks the
//! per-version verdicts a scan adapter would see, per VISIBILITY.md.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use vantage::config::TxConfig;
use vantage::manager::TransactionManager;
use vantage::persist::NoopPersistence;
use vantage::txn::{ChangeSet, Transaction, TxId, VisibilitySnapshot, MAX_TX_PER_MS};
use vantage::visibility::{FilterVerdict, StoredVersion, VisibilityFilter};

fn test_manager() -> TransactionManager {
    let config = TxConfig {
        sweep_interval_secs: 0,
        prune_interval_secs: 0,
        snapshot_interval_secs: 0,
        ..Default::default()
    };
    let mut manager = TransactionManager::new(config, Box::new(NoopPersistence::new()));
    manager.become_active().unwrap();
    manager
}

/// Builds the canonical history:
///
/// ```text
///   tx6 - in progress (the reader)
///   tx5 - committed
///   tx4 - invalid
///   tx3 - in progress
///   tx2 - committed
///   tx1 - committed
/// ```
///
/// Returns the manager, the six transactions in start order, and the reader.
fn mixed_history() -> (TransactionManager, Vec<TxId>, Transaction) {
    let manager = test_manager();

    let tx1 = manager.start_short().unwrap();
    manager.can_commit(&tx1, ChangeSet::new()).unwrap();
    manager.commit(&tx1).unwrap();

    let tx2 = manager.start_short().unwrap();
    manager.can_commit(&tx2, ChangeSet::new()).unwrap();
    manager.commit(&tx2).unwrap();

    let tx3 = manager.start_short().unwrap();
    let tx4 = manager.start_short().unwrap();
    manager.invalidate(tx4.id()).unwrap();

    let tx5 = manager.start_short().unwrap();
    manager.can_commit(&tx5, ChangeSet::new()).unwrap();
    manager.commit(&tx5).unwrap();

    let tx6 = manager.start_short().unwrap();

    let ids = vec![tx1.id(), tx2.id(), tx3.id(), tx4.id(), tx5.id(), tx6.id()];
    (manager, ids, tx6)
}

/// Verdicts for versions written by tx1..tx6, in that order.
fn verdicts_for(filter: &VisibilityFilter, ids: &[TxId]) -> Vec<FilterVerdict> {
    ids.iter()
        .map(|id| filter.decide(&StoredVersion::new("fam", id.value())))
        .collect()
}

#[test]
fn filtering_of_in_progress_and_invalid_writers() {
    let (_manager, ids, reader) = mixed_history();
    let filter = VisibilityFilter::for_transaction(&reader, HashMap::new());

    use FilterVerdict::*;
    assert_eq!(
        verdicts_for(&filter, &ids),
        vec![
            IncludeAndStopColumn, // tx1 committed
            IncludeAndStopColumn, // tx2 committed
            SkipVersion,          // tx3 in progress
            SkipVersion,          // tx4 invalid
            IncludeAndStopColumn, // tx5 committed
            IncludeAndStopColumn, // tx6: the reader's own write
        ]
    );
}

#[test]
fn verdicts_match_independent_per_call_evaluation() {
    // Evaluating the versions in any order, or repeatedly, gives the same
    // answers; the filter holds no scan state.
    let (_manager, ids, reader) = mixed_history();
    let filter = VisibilityFilter::for_transaction(&reader, HashMap::new());

    let forward = verdicts_for(&filter, &ids);
    let reversed: Vec<_> = ids
        .iter()
        .rev()
        .map(|id| filter.decide(&StoredVersion::new("fam", id.value())))
        .collect();
    let mut reversed_back = reversed.clone();
    reversed_back.reverse();
    assert_eq!(forward, reversed_back);
}

#[test]
fn include_predicate_preserves_transactional_verdicts() {
    let (_manager, ids, reader) = mixed_history();
    let filter = VisibilityFilter::for_transaction(&reader, HashMap::new())
        .with_predicate(Box::new(|_: &StoredVersion<'_>| FilterVerdict::Include));

    use FilterVerdict::*;
    assert_eq!(
        verdicts_for(&filter, &ids),
        vec![
            IncludeAndStopColumn,
            IncludeAndStopColumn,
            SkipVersion,
            SkipVersion,
            IncludeAndStopColumn,
            IncludeAndStopColumn,
        ]
    );
}

#[test]
fn skip_predicate_stops_columns_with_one_visible_version() {
    let (_manager, ids, reader) = mixed_history();
    let filter = VisibilityFilter::for_transaction(&reader, HashMap::new())
        .with_predicate(Box::new(|_: &StoredVersion<'_>| FilterVerdict::SkipVersion));

    use FilterVerdict::*;
    assert_eq!(
        verdicts_for(&filter, &ids),
        vec![
            StopColumn,  // visible but rejected: nothing older can help
            StopColumn,
            SkipVersion, // invisible versions never reach the predicate
            SkipVersion,
            StopColumn,
            StopColumn,
        ]
    );
}

#[test]
fn include_and_stop_predicate_preserves_transactional_verdicts() {
    let (_manager, ids, reader) = mixed_history();
    let filter = VisibilityFilter::for_transaction(&reader, HashMap::new()).with_predicate(
        Box::new(|_: &StoredVersion<'_>| FilterVerdict::IncludeAndStopColumn),
    );

    use FilterVerdict::*;
    assert_eq!(
        verdicts_for(&filter, &ids),
        vec![
            IncludeAndStopColumn,
            IncludeAndStopColumn,
            SkipVersion,
            SkipVersion,
            IncludeAndStopColumn,
            IncludeAndStopColumn,
        ]
    );
}

#[test]
fn stop_column_predicate_passes_through() {
    let (_manager, ids, reader) = mixed_history();
    let filter = VisibilityFilter::for_transaction(&reader, HashMap::new())
        .with_predicate(Box::new(|_: &StoredVersion<'_>| FilterVerdict::StopColumn));

    use FilterVerdict::*;
    assert_eq!(
        verdicts_for(&filter, &ids),
        vec![
            StopColumn,
            StopColumn,
            SkipVersion,
            SkipVersion,
            StopColumn,
            StopColumn,
        ]
    );
}

/// A storage adapter replacing the combination policy: predicate verdicts
/// win outright for include-ish results.
fn predicate_wins(tx_verdict: FilterVerdict, predicate_verdict: FilterVerdict) -> FilterVerdict {
    match predicate_verdict {
        FilterVerdict::Include => FilterVerdict::Include,
        FilterVerdict::IncludeAndStopColumn => FilterVerdict::IncludeAndStopColumn,
        FilterVerdict::SkipVersion => {
            if tx_verdict == FilterVerdict::Include {
                FilterVerdict::SkipVersion
            } else {
                FilterVerdict::StopColumn
            }
        }
        FilterVerdict::StopColumn => FilterVerdict::StopColumn,
    }
}

#[test]
fn custom_combination_policy_overrides_default() {
    let (_manager, ids, reader) = mixed_history();
    let filter = VisibilityFilter::for_transaction(&reader, HashMap::new())
        .with_predicate(Box::new(|_: &StoredVersion<'_>| FilterVerdict::Include))
        .with_combine_policy(predicate_wins);

    use FilterVerdict::*;
    assert_eq!(
        verdicts_for(&filter, &ids),
        vec![
            Include,
            Include,
            SkipVersion,
            SkipVersion,
            Include,
            Include,
        ]
    );
}

// --- TTL -------------------------------------------------------------------

const NOW_MS: i64 = 1_700_000_000_000;

fn ttl_filter() -> VisibilityFilter {
    let read_pointer = TxId::new(NOW_MS as u64 * MAX_TX_PER_MS);
    let snapshot = Arc::new(VisibilitySnapshot::new(
        read_pointer,
        BTreeSet::new(),
        BTreeSet::new(),
    ));
    let mut ttls = HashMap::new();
    ttls.insert("fam".to_string(), 10_i64);
    ttls.insert("fam2".to_string(), 30_i64);
    ttls.insert("fam3".to_string(), 0_i64);
    VisibilityFilter::new(snapshot, ttls)
}

fn tx_units(age_ms: u64) -> u64 {
    NOW_MS as u64 * MAX_TX_PER_MS - age_ms * MAX_TX_PER_MS
}

#[test]
fn ttl_filtering_of_transactional_versions() {
    let filter = ttl_filter();
    use FilterVerdict::*;

    let cases = [
        ("fam", 0, IncludeAndStopColumn),
        ("fam", 1, IncludeAndStopColumn),
        ("fam", 11, StopColumn),
        ("fam2", 11, IncludeAndStopColumn),
        ("fam2", 21, IncludeAndStopColumn),
        ("fam2", 31, StopColumn),
        // TTL of zero means no expiry.
        ("fam3", 31, IncludeAndStopColumn),
        ("fam3", 1001, IncludeAndStopColumn),
    ];
    for (column, age_ms, expected) in cases {
        assert_eq!(
            filter.decide(&StoredVersion::new(column, tx_units(age_ms))),
            expected,
            "column {} at age {}ms",
            column,
            age_ms
        );
    }
}

#[test]
fn ttl_filtering_of_pre_transactional_versions() {
    // Raw millisecond timestamps written before transactional writes began
    // follow the same cutoff once converted to the same time unit.
    let filter = ttl_filter();
    let pre_now = NOW_MS as u64;
    use FilterVerdict::*;

    let cases = [
        ("fam", pre_now, IncludeAndStopColumn),
        ("fam", pre_now - 9, IncludeAndStopColumn),
        ("fam", pre_now - 10, IncludeAndStopColumn),
        ("fam", pre_now - 11, StopColumn),
        ("fam3", pre_now, IncludeAndStopColumn),
        ("fam3", pre_now - 1001, IncludeAndStopColumn),
    ];
    for (column, write_id, expected) in cases {
        assert_eq!(
            filter.decide(&StoredVersion::new(column, write_id)),
            expected,
            "column {} write id {}",
            column,
            write_id
        );
    }
}

#[test]
fn columns_without_ttl_never_expire() {
    let filter = ttl_filter();
    assert_eq!(
        filter.decide(&StoredVersion::new("unconfigured", tx_units(100_000))),
        FilterVerdict::IncludeAndStopColumn
    );
}

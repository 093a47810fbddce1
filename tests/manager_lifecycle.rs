//! Lifecycle and failure-handling tests
//!
//! Per TRANSACTIONS.md §7 and ERRORS.md §4: an instance serves only between
//! `become_active` and `become_standby`, and halts permanently on a
//! persistence failure.

use vantage::config::TxConfig;
use vantage::manager::{LifecycleState, TransactionError, TransactionManager};
use vantage::persist::{
    NoopPersistence, PersistResult, PersistenceError, TxStatePersistence, TxStateSnapshot,
};
use vantage::txlog::{TxEdit, TxLogError, TxLogRecord};
use vantage::txn::{ChangeKey, ChangeSet};

fn config() -> TxConfig {
    TxConfig {
        sweep_interval_secs: 0,
        prune_interval_secs: 0,
        snapshot_interval_secs: 0,
        ..Default::default()
    }
}

fn set(keys: &[&str]) -> ChangeSet {
    keys.iter().map(|k| ChangeKey::from(*k)).collect()
}

/// Persistence that starts failing appends after a set number of successes.
struct FailingPersistence {
    successes_left: u32,
    next_sequence: u64,
}

impl FailingPersistence {
    fn failing_after(successes: u32) -> Self {
        Self {
            successes_left: successes,
            next_sequence: 1,
        }
    }
}

impl TxStatePersistence for FailingPersistence {
    fn append_edit(&mut self, _edit: &TxEdit) -> PersistResult<u64> {
        if self.successes_left == 0 {
            return Err(PersistenceError::from(TxLogError::fsync_failed(
                "injected failure",
                std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
            )));
        }
        self.successes_left -= 1;
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
        true
    }

    fn acquire(&mut self) -> PersistResult<()> {
        Ok(())
    }

    fn release(&mut self) -> PersistResult<()> {
        Ok(())
    }
}

#[test]
fn created_instance_refuses_service_until_active() {
    let manager = TransactionManager::new(config(), Box::new(NoopPersistence::new()));
    assert_eq!(manager.lifecycle(), LifecycleState::Created);
    assert!(matches!(
        manager.start_short().unwrap_err(),
        TransactionError::NotActive
    ));
}

#[test]
fn active_instance_serves_and_standby_stops() {
    let mut manager = TransactionManager::new(config(), Box::new(NoopPersistence::new()));
    manager.become_active().unwrap();
    assert_eq!(manager.lifecycle(), LifecycleState::Active);

    let tx = manager.start_short().unwrap();
    manager.abort(&tx).unwrap();

    manager.become_standby();
    assert_eq!(manager.lifecycle(), LifecycleState::Standby);
    assert!(matches!(
        manager.start_short().unwrap_err(),
        TransactionError::NotActive
    ));
}

#[test]
fn standby_instance_can_reactivate() {
    let mut manager = TransactionManager::new(config(), Box::new(NoopPersistence::new()));
    manager.become_active().unwrap();
    manager.become_standby();
    manager.become_active().unwrap();

    let tx = manager.start_short().unwrap();
    manager.can_commit(&tx, set(&["row1"])).unwrap();
    manager.commit(&tx).unwrap();
}

#[test]
fn ephemeral_persistence_loses_state_across_instances() {
    // Per PERSISTENCE.md §6 the no-op implementation is explicit about
    // losing everything; a new instance starts from nothing.
    let committed_key_owner = {
        let mut manager = TransactionManager::new(config(), Box::new(NoopPersistence::new()));
        manager.become_active().unwrap();
        let tx = manager.start_short().unwrap();
        manager.can_commit(&tx, set(&["row1"])).unwrap();
        manager.commit(&tx).unwrap();
        manager.stats().read_pointer
    };

    let mut manager = TransactionManager::new(config(), Box::new(NoopPersistence::new()));
    manager.become_active().unwrap();
    let stats = manager.stats();
    assert_eq!(stats.committed_change_sets, 0);
    assert_eq!(stats.invalid, 0);
    let _ = committed_key_owner;
}

#[test]
fn persistence_failure_halts_the_instance() {
    let mut manager =
        TransactionManager::new(config(), Box::new(FailingPersistence::failing_after(1)));
    manager.become_active().unwrap();

    // First append succeeds.
    let tx = manager.start_short().unwrap();

    // Second append fails: the operation errors and the instance halts
    // rather than serving divergent state.
    let err = manager.start_short().unwrap_err();
    assert!(matches!(err, TransactionError::Persistence(_)));
    assert!(!err.is_recoverable());
    assert_eq!(manager.lifecycle(), LifecycleState::Halted);

    // Everything afterwards, including operations that would not touch the
    // log, is refused.
    assert!(matches!(
        manager.can_commit(&tx, set(&["row1"])).unwrap_err(),
        TransactionError::Halted
    ));
}

#[test]
fn halted_instance_cannot_reactivate() {
    let mut manager =
        TransactionManager::new(config(), Box::new(FailingPersistence::failing_after(0)));
    manager.become_active().unwrap();
    let _ = manager.start_short().unwrap_err();
    assert_eq!(manager.lifecycle(), LifecycleState::Halted);

    assert!(manager.become_active().is_err());
}

#[test]
fn commit_grace_zero_lapses_immediately() {
    let grace_config = TxConfig {
        commit_grace_secs: 0,
        sweep_interval_secs: 0,
        prune_interval_secs: 0,
        snapshot_interval_secs: 0,
        ..Default::default()
    };
    let mut manager = TransactionManager::new(grace_config, Box::new(NoopPersistence::new()));
    manager.become_active().unwrap();

    let tx = manager.start_short().unwrap();
    manager.can_commit(&tx, set(&["row1"])).unwrap();

    // The stage lapsed the instant it was created; commit must fail
    // recoverably and the transaction stays in progress.
    let err = manager.commit(&tx).unwrap_err();
    assert!(matches!(err, TransactionError::CommitGraceExpired(_)));
    assert!(err.is_recoverable());
    assert_eq!(manager.stats().in_progress, 1);

    manager.abort(&tx).unwrap();
}

#[test]
fn expiry_sweep_invalidates_timed_out_transactions() {
    // A zero-second short timeout expires transactions immediately, making
    // the sweep deterministic to test. Long transactions keep running.
    let expiry_config = TxConfig {
        tx_timeout_secs: 0,
        ..config()
    };
    let mut manager = TransactionManager::new(expiry_config, Box::new(NoopPersistence::new()));
    manager.become_active().unwrap();

    let short = manager.start_short().unwrap();
    let long = manager.start_long().unwrap();
    manager.run_expiry_sweep();

    let stats = manager.stats();
    assert_eq!(stats.in_progress, 1);
    assert_eq!(stats.invalid, 1);
    assert!(manager.snapshot().is_invalid(short.id()));
    assert!(manager.snapshot().is_excluded(long.id()));

    // The expired transaction was invalidated, not silently dropped.
    assert!(matches!(
        manager.commit(&short).unwrap_err(),
        TransactionError::NotInProgress(_) | TransactionError::CommitGraceExpired(_)
    ));
}

#[test]
fn snapshot_is_lock_free_for_readers() {
    let mut manager = TransactionManager::new(config(), Box::new(NoopPersistence::new()));
    manager.become_active().unwrap();

    let before = manager.snapshot();
    let tx = manager.start_short().unwrap();
    let after = manager.snapshot();

    // The pre-start snapshot is an immutable object, untouched by the
    // mutation; the post-start snapshot is a fresh object.
    assert!(!before.is_excluded(tx.id()));
    assert!(after.is_excluded(tx.id()));
}

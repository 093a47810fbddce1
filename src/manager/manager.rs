//! TransactionManager - the single logical transaction authority
//!
//! Per TRANSACTIONS.md §7: one mutex guards the registry state and the
//! persistence handle; every mutating operation appends its edit durably
//! inside the critical section before the transition is acknowledged. The
//! current visibility snapshot is republished as an immutable `Arc` after
//! every state change; readers clone it without contending with writers.
//!
//! Lifecycle: `new` -> `become_active` (recovery, then serving, then
//! background maintenance) -> `become_standby` / `shutdown`. Leader election
//! is an external concern; this object only reacts to "become active" and
//! "become standby".

use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::TxConfig;
use crate::observability::{LogLevel, Logger};
use crate::persist::{PersistenceError, TxStatePersistence};
use crate::recovery::{recover, RecoveryError};
use crate::txlog::TxEdit;
use crate::txn::{ChangeSet, Transaction, TransactionType, TxId, TxIdClock, VisibilitySnapshot};

use super::errors::{TransactionError, TxResult};
use super::registry::{PruneStats, RegistryState};

/// Lifecycle states of a manager instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, not yet recovered.
    Created,
    /// Recovered and serving.
    Active,
    /// Not serving; persistence released for another instance.
    Standby,
    /// Stopped serving after a persistence failure (ERRORS.md §4).
    Halted,
    /// Shut down for good.
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Active => "active",
            LifecycleState::Standby => "standby",
            LifecycleState::Halted => "halted",
            LifecycleState::Stopped => "stopped",
        }
    }
}

/// Counters for operational introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStats {
    pub lifecycle: LifecycleState,
    pub read_pointer: TxId,
    pub write_pointer: TxId,
    pub in_progress: usize,
    pub staged: usize,
    pub invalid: usize,
    pub committed_change_sets: usize,
}

/// Everything behind the single mutual-exclusion domain.
struct Core {
    registry: RegistryState,
    clock: TxIdClock,
    persistence: Box<dyn TxStatePersistence>,
    lifecycle: LifecycleState,
}

/// State shared with the maintenance threads.
struct Shared {
    core: Mutex<Core>,
    /// The published snapshot; replaced wholesale on every state change so
    /// readers never observe partial mutations.
    published: RwLock<Arc<VisibilitySnapshot>>,
    config: TxConfig,
    shutdown_flag: Mutex<bool>,
    shutdown_cv: Condvar,
}

/// The single logical transaction authority.
pub struct TransactionManager {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn lock_core(shared: &Shared) -> MutexGuard<'_, Core> {
    shared.core.lock().expect("registry lock poisoned")
}

fn ensure_active(core: &Core) -> TxResult<()> {
    match core.lifecycle {
        LifecycleState::Active => Ok(()),
        LifecycleState::Halted => Err(TransactionError::Halted),
        _ => Err(TransactionError::NotActive),
    }
}

/// Halts the instance after a persistence failure and logs at FATAL.
fn halt(core: &mut Core, error: &PersistenceError) {
    core.lifecycle = LifecycleState::Halted;
    let message = error.to_string();
    Logger::log(
        LogLevel::Fatal,
        "manager_halted",
        &[("code", error.code()), ("error", message.as_str())],
    );
}

/// Appends one edit write-ahead; a failure halts the instance.
fn append_edit(core: &mut Core, edit: &TxEdit) -> TxResult<u64> {
    match core.persistence.append_edit(edit) {
        Ok(sequence) => Ok(sequence),
        Err(error) => {
            halt(core, &error);
            Err(TransactionError::Persistence(error))
        }
    }
}

/// Republishes the visibility snapshot after a state change.
fn publish(shared: &Shared, core: &Core) {
    let snapshot = Arc::new(core.registry.visibility_snapshot());
    *shared
        .published
        .write()
        .expect("published snapshot lock poisoned") = snapshot;
}

fn next_id(core: &mut Core) -> TxResult<TxId> {
    match core.clock.next() {
        Ok(id) => Ok(id),
        Err(error) => {
            let detail = error.to_string();
            Logger::log(
                LogLevel::Warn,
                "txid_budget_exhausted",
                &[("detail", detail.as_str())],
            );
            Err(TransactionError::Clock(error))
        }
    }
}

impl TransactionManager {
    /// Creates an inactive instance. No recovery runs and no requests are
    /// served until `become_active`.
    pub fn new(config: TxConfig, persistence: Box<dyn TxStatePersistence>) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    registry: RegistryState::new(),
                    clock: TxIdClock::new(),
                    persistence,
                    lifecycle: LifecycleState::Created,
                }),
                published: RwLock::new(Arc::new(VisibilitySnapshot::default())),
                config,
                shutdown_flag: Mutex::new(false),
                shutdown_cv: Condvar::new(),
            }),
            workers: Vec::new(),
        }
    }

    // --- lifecycle ---------------------------------------------------------

    /// Runs recovery and begins serving.
    ///
    /// Per TRANSACTIONS.md §7 a new active instance must complete recovery
    /// before serving and never serves a lower write pointer than was
    /// previously durable (the clock is seeded from the recovered pointer).
    pub fn become_active(&mut self) -> Result<(), RecoveryError> {
        {
            let mut core = lock_core(&self.shared);
            match core.lifecycle {
                LifecycleState::Active => return Ok(()),
                LifecycleState::Halted => {
                    return Err(RecoveryError::replay(
                        "halted instance must be restarted before reactivation",
                    ))
                }
                _ => {}
            }

            core.persistence.acquire()?;
            let recovered = recover(core.persistence.as_mut(), now_ms())?;
            core.registry = recovered.registry;
            core.clock = TxIdClock::seeded(core.registry.write_pointer());

            // The stale invalidations recovery applied become durable edits
            // now that the log is writable.
            for id in &recovered.stale {
                core.persistence.append_edit(&TxEdit::Invalidate { id: *id })?;
            }

            core.lifecycle = LifecycleState::Active;
            publish(&self.shared, &core);

            let read_pointer = core.registry.read_pointer().to_string();
            let write_pointer = core.registry.write_pointer().to_string();
            Logger::log(
                LogLevel::Info,
                "manager_active",
                &[
                    ("read_pointer", read_pointer.as_str()),
                    ("write_pointer", write_pointer.as_str()),
                ],
            );
        }

        self.spawn_workers();
        Ok(())
    }

    /// Stops serving and releases the persistence handle so another
    /// instance can take over.
    pub fn become_standby(&mut self) {
        self.stop_workers();
        let mut core = lock_core(&self.shared);
        if core.lifecycle == LifecycleState::Halted {
            return;
        }
        core.lifecycle = LifecycleState::Standby;
        if let Err(error) = core.persistence.release() {
            let message = error.to_string();
            Logger::log(
                LogLevel::Error,
                "persistence_release_failed",
                &[("error", message.as_str())],
            );
        }
        Logger::log(LogLevel::Info, "manager_standby", &[]);
    }

    /// Permanently stops this instance. Does not write a final snapshot;
    /// durability comes from the edit log alone.
    pub fn shutdown(&mut self) {
        self.stop_workers();
        let mut core = lock_core(&self.shared);
        if core.lifecycle != LifecycleState::Halted {
            core.lifecycle = LifecycleState::Stopped;
            let _ = core.persistence.release();
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        lock_core(&self.shared).lifecycle
    }

    // --- client operations (TRANSACTIONS.md §2) ----------------------------

    /// Starts a short transaction.
    pub fn start_short(&self) -> TxResult<Transaction> {
        self.start(TransactionType::Short)
    }

    /// Starts a long-running transaction.
    pub fn start_long(&self) -> TxResult<Transaction> {
        self.start(TransactionType::Long)
    }

    /// Starts a transaction: allocates an id, logs the start write-ahead,
    /// records the in-progress entry, and returns the immutable handle with
    /// its frozen snapshot.
    pub fn start(&self, tx_type: TransactionType) -> TxResult<Transaction> {
        let mut core = lock_core(&self.shared);
        ensure_active(&core)?;

        let now = now_ms();
        let id = next_id(&mut core)?;
        let timeout_ms = self.shared.config.timeout_ms(tx_type);
        append_edit(
            &mut core,
            &TxEdit::Start {
                id,
                tx_type,
                start_ms: now,
                expiry_ms: now + timeout_ms,
            },
        )?;
        let tx = core.registry.begin(id, tx_type, now, timeout_ms);
        publish(&self.shared, &core);
        Ok(tx)
    }

    /// Conflict-checks and stages a change set for commit.
    ///
    /// Read-only with respect to committed state; the stage lapses after
    /// the configured commit grace (TRANSACTIONS.md §5), so staging is not
    /// logged and a crash in between merely costs a retry.
    pub fn can_commit(&self, tx: &Transaction, change_set: ChangeSet) -> TxResult<()> {
        let mut core = lock_core(&self.shared);
        ensure_active(&core)?;
        core.registry.check_and_stage(
            tx,
            change_set,
            now_ms(),
            self.shared.config.commit_grace_ms(),
        )
    }

    /// Commits a staged transaction, returning the commit id its change set
    /// was recorded under.
    pub fn commit(&self, tx: &Transaction) -> TxResult<TxId> {
        let mut core = lock_core(&self.shared);
        ensure_active(&core)?;

        let now = now_ms();
        let change_set = core.registry.staged_change_set(tx.id(), now)?;
        let commit_id = next_id(&mut core)?;
        append_edit(
            &mut core,
            &TxEdit::Commit {
                tx_id: tx.id(),
                commit_id,
                change_set: change_set.clone(),
            },
        )?;
        core.registry.apply_commit(tx.id(), commit_id, change_set);
        publish(&self.shared, &core);
        Ok(commit_id)
    }

    /// Aborts a transaction. Idempotent; aborting an already-finished
    /// transaction is a no-op.
    pub fn abort(&self, tx: &Transaction) -> TxResult<()> {
        let mut core = lock_core(&self.shared);
        ensure_active(&core)?;

        if !core.registry.is_in_progress(tx.id()) {
            return Ok(());
        }
        append_edit(&mut core, &TxEdit::Abort { id: tx.id() })?;
        core.registry.abort(tx.id());
        publish(&self.shared, &core);
        Ok(())
    }

    /// Moves an in-progress id to the invalid set. Returns false if the id
    /// was not in progress.
    pub fn invalidate(&self, id: TxId) -> TxResult<bool> {
        let mut core = lock_core(&self.shared);
        ensure_active(&core)?;

        if !core.registry.is_in_progress(id) {
            return Ok(false);
        }
        append_edit(&mut core, &TxEdit::Invalidate { id })?;
        core.registry.invalidate(id);
        publish(&self.shared, &core);
        Ok(true)
    }

    /// Administrative removal of invalid ids whose storage-side debris has
    /// been confirmed cleaned. Returns how many were present.
    pub fn truncate_invalid(&self, ids: &[TxId]) -> TxResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut core = lock_core(&self.shared);
        ensure_active(&core)?;

        append_edit(&mut core, &TxEdit::TruncateInvalid { ids: ids.to_vec() })?;
        let removed = core.registry.truncate_invalid(ids);
        if removed > 0 {
            publish(&self.shared, &core);
        }
        Ok(removed)
    }

    /// The current visibility snapshot, for readers outside any transaction.
    ///
    /// Lock-free with respect to mutating operations: the snapshot is an
    /// immutable object swapped atomically on every state change.
    pub fn snapshot(&self) -> Arc<VisibilitySnapshot> {
        self.shared
            .published
            .read()
            .expect("published snapshot lock poisoned")
            .clone()
    }

    pub fn stats(&self) -> ManagerStats {
        let core = lock_core(&self.shared);
        ManagerStats {
            lifecycle: core.lifecycle,
            read_pointer: core.registry.read_pointer(),
            write_pointer: core.registry.write_pointer(),
            in_progress: core.registry.in_progress_count(),
            staged: core.registry.staged_count(),
            invalid: core.registry.invalid_count(),
            committed_change_sets: core.registry.committed_change_set_count(),
        }
    }

    // --- maintenance (also run by the background threads) ------------------

    /// One expiry sweep pass (TRANSACTIONS.md §5).
    pub fn run_expiry_sweep(&self) {
        sweep_pass(&self.shared);
    }

    /// One prune pass (TRANSACTIONS.md §6).
    pub fn run_prune(&self) {
        prune_pass(&self.shared);
    }

    /// Writes a full-state snapshot and truncates the edit log
    /// (PERSISTENCE.md §3-§4).
    pub fn write_state_snapshot(&self) -> TxResult<()> {
        snapshot_pass(&self.shared)
    }

    // --- workers -----------------------------------------------------------

    fn spawn_workers(&mut self) {
        if !self.workers.is_empty() {
            return;
        }
        let schedules: [(&str, u64, fn(&Shared)); 3] = [
            (
                "vantage-sweep",
                self.shared.config.sweep_interval_secs,
                sweep_pass,
            ),
            (
                "vantage-prune",
                self.shared.config.prune_interval_secs,
                prune_pass,
            ),
            (
                "vantage-snapshot",
                self.shared.config.snapshot_interval_secs,
                snapshot_task,
            ),
        ];
        for (name, interval_secs, task) in schedules {
            if interval_secs == 0 {
                continue;
            }
            self.workers.push(spawn_periodic(
                self.shared.clone(),
                name,
                Duration::from_secs(interval_secs),
                task,
            ));
        }
    }

    fn stop_workers(&mut self) {
        {
            let mut flag = self
                .shared
                .shutdown_flag
                .lock()
                .expect("shutdown flag poisoned");
            *flag = true;
        }
        self.shared.shutdown_cv.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        let mut flag = self
            .shared
            .shutdown_flag
            .lock()
            .expect("shutdown flag poisoned");
        *flag = false;
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

fn spawn_periodic(
    shared: Arc<Shared>,
    name: &str,
    interval: Duration,
    task: fn(&Shared),
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || loop {
            {
                let flag = shared
                    .shutdown_flag
                    .lock()
                    .expect("shutdown flag poisoned");
                if *flag {
                    return;
                }
                let (flag, _timeout) = shared
                    .shutdown_cv
                    .wait_timeout(flag, interval)
                    .expect("shutdown flag poisoned");
                if *flag {
                    return;
                }
            }
            task(&shared);
        })
        .expect("failed to spawn maintenance thread")
}

/// Expiry sweep: lapsed stages revert, expired transactions invalidate.
fn sweep_pass(shared: &Shared) {
    let mut core = lock_core(shared);
    if core.lifecycle != LifecycleState::Active {
        return;
    }
    let now = now_ms();

    for id in core.registry.revert_lapsed_stages(now) {
        let tx_id = id.to_string();
        Logger::log(LogLevel::Info, "stage_lapsed", &[("tx_id", tx_id.as_str())]);
    }

    let expired = core.registry.expired_ids(now);
    if expired.is_empty() {
        return;
    }
    for id in expired {
        // Expired entries are invalidated, never silently removed: their
        // partial writes may already be visible in storage.
        if append_edit(&mut core, &TxEdit::Invalidate { id }).is_err() {
            return;
        }
        core.registry.invalidate(id);
        let tx_id = id.to_string();
        Logger::log(
            LogLevel::Warn,
            "transaction_expired",
            &[("tx_id", tx_id.as_str())],
        );
    }
    publish(shared, &core);
}

/// Prune pass: drops history no live or future reader can reference.
fn prune_pass(shared: &Shared) {
    let mut core = lock_core(shared);
    if core.lifecycle != LifecycleState::Active {
        return;
    }
    let horizon = core
        .registry
        .prune_horizon(now_ms(), shared.config.long_tx_timeout_ms());
    let stats: PruneStats = core.registry.prune(horizon);
    if stats.committed_removed == 0 && stats.invalid_removed == 0 {
        return;
    }
    publish(shared, &core);
    let committed = stats.committed_removed.to_string();
    let invalid = stats.invalid_removed.to_string();
    let horizon_str = horizon.to_string();
    Logger::log(
        LogLevel::Info,
        "prune_complete",
        &[
            ("committed_removed", committed.as_str()),
            ("horizon", horizon_str.as_str()),
            ("invalid_removed", invalid.as_str()),
        ],
    );
}

/// Snapshot pass returning the outcome for the public entry point.
fn snapshot_pass(shared: &Shared) -> TxResult<()> {
    let mut core = lock_core(shared);
    ensure_active(&core)?;
    if !core.persistence.is_durable() {
        return Ok(());
    }
    let snapshot = core.registry.state_snapshot();
    match core.persistence.write_snapshot(&snapshot) {
        Ok(()) => {
            let write_pointer = snapshot.write_pointer.to_string();
            Logger::log(
                LogLevel::Info,
                "state_snapshot_written",
                &[("write_pointer", write_pointer.as_str())],
            );
            Ok(())
        }
        Err(error) => {
            halt(&mut core, &error);
            Err(TransactionError::Persistence(error))
        }
    }
}

/// Background wrapper over `snapshot_pass`; failures are already logged and
/// the instance halted, nothing more to do on a worker thread.
fn snapshot_task(shared: &Shared) {
    let _ = snapshot_pass(shared);
}

#[cfg(test)]
mod tests {
    use crate::persist::NoopPersistence;
    use crate::txn::ChangeKey;

    use super::*;

    /// Manager on ephemeral persistence with background threads disabled so
    /// tests drive maintenance explicitly.
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

    fn set(keys: &[&str]) -> ChangeSet {
        keys.iter().map(|k| ChangeKey::from(*k)).collect()
    }

    #[test]
    fn test_operations_require_active_state() {
        let manager = TransactionManager::new(
            TxConfig::default(),
            Box::new(NoopPersistence::new()),
        );
        assert!(matches!(
            manager.start_short().unwrap_err(),
            TransactionError::NotActive
        ));
    }

    #[test]
    fn test_start_commit_cycle() {
        let manager = test_manager();
        let tx = manager.start_short().unwrap();

        manager.can_commit(&tx, set(&["row1"])).unwrap();
        let commit_id = manager.commit(&tx).unwrap();

        assert!(commit_id > tx.id());
        let stats = manager.stats();
        assert_eq!(stats.read_pointer, commit_id);
        assert_eq!(stats.in_progress, 0);
    }

    #[test]
    fn test_snapshot_reflects_commits() {
        let manager = test_manager();
        let tx = manager.start_short().unwrap();
        manager.can_commit(&tx, set(&["row1"])).unwrap();
        let commit_id = manager.commit(&tx).unwrap();

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.read_pointer(), commit_id);
        assert!(snapshot.is_visible(tx.id()));
    }

    #[test]
    fn test_overlapping_transactions_conflict() {
        let manager = test_manager();
        let tx1 = manager.start_short().unwrap();
        let tx2 = manager.start_short().unwrap();

        manager.can_commit(&tx1, set(&["row1"])).unwrap();
        manager.commit(&tx1).unwrap();

        let err = manager.can_commit(&tx2, set(&["row1"])).unwrap_err();
        assert!(matches!(err, TransactionError::Conflict { .. }));
    }

    #[test]
    fn test_commit_without_can_commit_fails() {
        let manager = test_manager();
        let tx = manager.start_short().unwrap();
        assert!(matches!(
            manager.commit(&tx).unwrap_err(),
            TransactionError::CommitGraceExpired(_)
        ));
    }

    #[test]
    fn test_invalidate_then_commit_fails() {
        let manager = test_manager();
        let tx = manager.start_short().unwrap();
        manager.can_commit(&tx, set(&["row1"])).unwrap();

        assert!(manager.invalidate(tx.id()).unwrap());
        assert!(matches!(
            manager.commit(&tx).unwrap_err(),
            TransactionError::NotInProgress(_)
        ));
        assert!(manager.snapshot().is_invalid(tx.id()));
    }

    #[test]
    fn test_abort_is_idempotent() {
        let manager = test_manager();
        let tx = manager.start_short().unwrap();
        manager.abort(&tx).unwrap();
        manager.abort(&tx).unwrap();
        assert_eq!(manager.stats().in_progress, 0);
        assert_eq!(manager.stats().invalid, 0);
    }

    #[test]
    fn test_standby_refuses_service() {
        let mut manager = test_manager();
        manager.become_standby();
        assert!(matches!(
            manager.start_short().unwrap_err(),
            TransactionError::NotActive
        ));
        assert_eq!(manager.lifecycle(), LifecycleState::Standby);
    }

    #[test]
    fn test_become_active_is_idempotent() {
        let mut manager = test_manager();
        manager.become_active().unwrap();
        assert_eq!(manager.lifecycle(), LifecycleState::Active);
    }
}

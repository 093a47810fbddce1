//! Startup recovery
//!
//! Per PERSISTENCE.md §5: load the latest snapshot, replay the edit log,
//! then invalidate any in-progress entry whose expiry passed while the
//! instance was down. The caller (the manager's `become_active`) appends
//! the matching INVALIDATE edits once the log is writable and seeds the id
//! clock from the recovered write pointer.

use crate::manager::RegistryState;
use crate::observability::{LogLevel, Logger};
use crate::persist::TxStatePersistence;
use crate::txn::TxId;

use super::errors::{RecoveryError, RecoveryResult};
use super::replay::{replay, ReplayStats};

/// The outcome of recovery.
#[derive(Debug)]
pub struct RecoveredState {
    /// The reconstructed registry, stale entries already invalidated.
    pub registry: RegistryState,
    pub stats: ReplayStats,
    /// Ids invalidated because their expiry passed during downtime. The
    /// caller must log INVALIDATE edits for these before serving.
    pub stale: Vec<TxId>,
}

/// Reconstructs registry state from durable storage.
pub fn recover(
    persistence: &mut dyn TxStatePersistence,
    now_ms: i64,
) -> RecoveryResult<RecoveredState> {
    let mut registry = match persistence.load_latest_snapshot()? {
        Some(snapshot) => {
            if snapshot.read_pointer > snapshot.write_pointer {
                return Err(RecoveryError::replay(format!(
                    "Snapshot read pointer {} exceeds write pointer {}",
                    snapshot.read_pointer, snapshot.write_pointer
                )));
            }
            RegistryState::restore(&snapshot)
        }
        None => RegistryState::new(),
    };

    let records = persistence.replay_edits()?;
    let stats = replay(&mut registry, &records)?;

    // Expired entries are invalidated, never silently dropped: their
    // partial writes may already be visible in storage.
    let stale = registry.expired_ids(now_ms);
    for id in &stale {
        registry.invalidate(*id);
        let tx_id = id.to_string();
        Logger::log(
            LogLevel::Warn,
            "recovery_stale_invalidated",
            &[("tx_id", tx_id.as_str())],
        );
    }

    let records_replayed = stats.records_replayed.to_string();
    let read_pointer = registry.read_pointer().to_string();
    let write_pointer = registry.write_pointer().to_string();
    let in_progress = registry.in_progress_count().to_string();
    let invalid = registry.invalid_count().to_string();
    Logger::log(
        LogLevel::Info,
        "recovery_complete",
        &[
            ("records_replayed", records_replayed.as_str()),
            ("read_pointer", read_pointer.as_str()),
            ("write_pointer", write_pointer.as_str()),
            ("in_progress", in_progress.as_str()),
            ("invalid", invalid.as_str()),
        ],
    );

    Ok(RecoveredState {
        registry,
        stats,
        stale,
    })
}

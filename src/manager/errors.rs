//! Transaction manager error types
//!
//! Per ERRORS.md §3, conflicts, not-in-progress, lapsed commit grace, and id
//! exhaustion are ordinary outcomes the caller handles; they are never
//! retried inside the core. Persistence failures are fatal to the active
//! instance (ERRORS.md §4).

use thiserror::Error;

use crate::persist::PersistenceError;
use crate::txn::{ChangeKey, ClockError, TxId};

/// Result type for transaction manager operations.
pub type TxResult<T> = Result<T, TransactionError>;

/// Errors surfaced by the transaction manager.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `canCommit` found an overlapping change set committed after the
    /// transaction's read pointer, or staged by a concurrent committer.
    /// Recoverable: abort and retry with a new transaction.
    #[error("transaction {tx_id} conflicts on key {key}")]
    Conflict { tx_id: TxId, key: ChangeKey },

    /// The referenced id already committed, aborted, expired, or was
    /// invalidated. Recoverable: treat as an abort.
    #[error("transaction {0} is not in progress")]
    NotInProgress(TxId),

    /// The stage created by `canCommit` lapsed before `commit` arrived
    /// (TRANSACTIONS.md §5). Recoverable: re-run `canCommit`.
    #[error("transaction {0} has no live staged change set; re-run canCommit")]
    CommitGraceExpired(TxId),

    /// Id allocation stalled for one millisecond (TRANSACTIONS.md §1).
    /// Recoverable: retry next millisecond.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// The instance is not serving (created, standby, or stopped).
    #[error("transaction manager is not active")]
    NotActive,

    /// The instance halted after a persistence failure and refuses all
    /// further operations until failover (ERRORS.md §4).
    #[error("transaction manager halted after a persistence failure")]
    Halted,

    /// Durable logging or snapshotting failed; the instance halts.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl TransactionError {
    /// Whether the caller can recover by adjusting and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransactionError::Conflict { .. }
                | TransactionError::NotInProgress(_)
                | TransactionError::CommitGraceExpired(_)
                | TransactionError::Clock(_)
        )
    }
}

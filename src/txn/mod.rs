//! Transaction Domain Types
//!
//! Per TRANSACTIONS.md:
//! - `TxId` - totally ordered, timestamp-derived transaction identity
//! - `TxIdClock` - monotonic id allocation, restart-safe
//! - `ChangeKey` / `ChangeSet` - opaque keys written by a transaction
//! - `VisibilitySnapshot` - a reader's frozen view of transaction state
//! - `Transaction` - the immutable client handle

mod change_set;
mod clock;
mod id;
mod snapshot;
mod transaction;

pub use change_set::{ChangeKey, ChangeSet};
pub use clock::{ClockError, TimeSource, TxIdClock};
pub use id::{is_pre_transactional, write_id_millis, TxId, MAX_NON_TX_TIMESTAMP, MAX_TX_PER_MS};
pub use snapshot::VisibilitySnapshot;
pub use transaction::{Transaction, TransactionType};

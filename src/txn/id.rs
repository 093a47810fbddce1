//! TxId - Totally ordered, timestamp-derived transaction identity
//!
//! Per TRANSACTIONS.md §1:
//! - `id = wall_clock_millis * MAX_TX_PER_MS + counter`
//! - Strictly increasing across allocations and restarts
//! - `id / MAX_TX_PER_MS` recovers the approximate wall-clock millisecond
//!
//! This is a PURE TYPE with no behavior beyond construction, access, and the
//! millisecond conversion.

use std::fmt;

/// Maximum transaction ids issued per wall-clock millisecond.
///
/// Per TRANSACTIONS.md §1, this factor both bounds id collisions and lets any
/// id be converted back to an approximate timestamp by integer division.
pub const MAX_TX_PER_MS: u64 = 1_000_000;

/// Values below this threshold cannot be transaction ids.
///
/// Per TRANSACTIONS.md §1 they are raw millisecond timestamps written before
/// transactional writes began, and are scaled by `MAX_TX_PER_MS` when
/// compared against id-derived times.
pub const MAX_NON_TX_TIMESTAMP: u64 = 1_000_000_000_000_000_000;

/// A totally ordered transaction identity.
///
/// Per TRANSACTIONS.md §1 the ordering of ids is the sole authority for
/// snapshot visibility; no two allocations share a value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TxId(u64);

impl TxId {
    /// Creates a TxId with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    ///
    /// Exists for serialization and logging; application code should not
    /// depend on the internal representation.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Approximate wall-clock millisecond this id was allocated in.
    #[inline]
    pub fn epoch_millis(&self) -> i64 {
        (self.0 / MAX_TX_PER_MS) as i64
    }

    /// The first id of the slot for the given wall-clock millisecond.
    ///
    /// Used to convert a time horizon into an id horizon when pruning.
    #[inline]
    pub fn first_in_millis(millis: i64) -> Self {
        Self((millis.max(0) as u64).saturating_mul(MAX_TX_PER_MS))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns true if a stored write id predates transactional writes.
///
/// Per TRANSACTIONS.md §1: anything below `MAX_NON_TX_TIMESTAMP` is a raw
/// millisecond timestamp, not a transaction id.
#[inline]
pub fn is_pre_transactional(write_id: u64) -> bool {
    write_id < MAX_NON_TX_TIMESTAMP
}

/// Converts a stored write id to milliseconds for TTL comparison.
///
/// Raw pre-transactional timestamps are already in milliseconds;
/// transactional ids are divided back down. Per VISIBILITY.md §2.
#[inline]
pub fn write_id_millis(write_id: u64) -> i64 {
    if is_pre_transactional(write_id) {
        write_id as i64
    } else {
        (write_id / MAX_TX_PER_MS) as i64
    }
}

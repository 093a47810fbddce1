//! TxIdClock - Monotonic allocation of transaction ids
//!
//! Per TRANSACTIONS.md §1:
//! - Ids are strictly increasing across calls and restarts
//! - Seeded from the durable write pointer on recovery, never rewound
//! - Backward wall-clock jumps fall back to counter-only increments
//! - Allocation fails only when an entire millisecond's counter budget is
//!   exhausted; the failure is recoverable and self-correcting

use std::fmt;

use super::id::{TxId, MAX_TX_PER_MS};

/// Source of wall-clock milliseconds, injectable for deterministic tests.
pub type TimeSource = Box<dyn Fn() -> i64 + Send>;

fn system_time_source() -> TimeSource {
    Box::new(|| chrono::Utc::now().timestamp_millis())
}

/// Allocator of strictly increasing transaction ids.
///
/// The clock only tracks the last issued value; durability of the write
/// pointer belongs to the persistence layer (PERSISTENCE.md §1).
pub struct TxIdClock {
    last: u64,
    time_source: TimeSource,
}

impl TxIdClock {
    /// A clock for a fresh instance with no durable history.
    pub fn new() -> Self {
        Self::seeded(TxId::new(0))
    }

    /// A clock seeded from a recovered write pointer.
    ///
    /// Per TRANSACTIONS.md §1 the clock must never issue an id at or below
    /// the highest durable id, even if the wall clock moved backward while
    /// the instance was down.
    pub fn seeded(write_pointer: TxId) -> Self {
        Self {
            last: write_pointer.value(),
            time_source: system_time_source(),
        }
    }

    /// A seeded clock with an explicit time source. Test hook.
    pub fn with_time_source(write_pointer: TxId, time_source: TimeSource) -> Self {
        Self {
            last: write_pointer.value(),
            time_source,
        }
    }

    /// Allocates the next id.
    ///
    /// A fresh wall-clock millisecond takes the first id of its slot;
    /// otherwise the counter within the current slot is incremented. The
    /// increment path also covers backward clock jumps, temporarily encoding
    /// a future millisecond rather than ever producing a duplicate or
    /// decreasing id.
    ///
    /// # Errors
    ///
    /// `ClockError::CounterExhausted` when the increment would cross into the
    /// next millisecond slot: the current slot's budget of `MAX_TX_PER_MS`
    /// ids is fully consumed. Callers surface this to the client; the next
    /// wall-clock millisecond clears it.
    pub fn next(&mut self) -> Result<TxId, ClockError> {
        let now_ms = (self.time_source)().max(0) as u64;
        let slot_start = now_ms.saturating_mul(MAX_TX_PER_MS);

        let id = if slot_start > self.last {
            slot_start
        } else {
            let candidate = self.last + 1;
            if candidate % MAX_TX_PER_MS == 0 {
                return Err(ClockError::CounterExhausted {
                    millisecond: (self.last / MAX_TX_PER_MS) as i64,
                });
            }
            candidate
        };

        self.last = id;
        Ok(TxId::new(id))
    }

    /// The highest id issued or seeded so far.
    pub fn watermark(&self) -> TxId {
        TxId::new(self.last)
    }
}

impl Default for TxIdClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from id allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// The counter budget for one millisecond slot is fully consumed.
    CounterExhausted { millisecond: i64 },
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::CounterExhausted { millisecond } => write!(
                f,
                "transaction id budget exhausted for millisecond {}",
                millisecond
            ),
        }
    }
}

impl std::error::Error for ClockError {}

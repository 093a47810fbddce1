//! Transaction - an immutable handle owned by the issuing client
//!
//! Per TRANSACTIONS.md §2/§3: created by `start`, never mutated afterward.
//! The registry references transactions by id; it does not hold them.

use super::id::TxId;
use super::snapshot::VisibilitySnapshot;

/// Expected lifetime class of a transaction.
///
/// Per TRANSACTIONS.md §5 the class selects which timeout applies before the
/// expiry sweep invalidates an unfinished transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransactionType {
    Short = 0,
    Long = 1,
}

impl TransactionType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TransactionType::Short),
            1 => Some(TransactionType::Long),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Short => "short",
            TransactionType::Long => "long",
        }
    }
}

/// A client's handle on one transaction.
///
/// Immutable once created. The embedded snapshot was frozen at start time
/// (TRANSACTIONS.md §3) and is what the client hands to read-side filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TxId,
    tx_type: TransactionType,
    snapshot: VisibilitySnapshot,
}

impl Transaction {
    pub fn new(id: TxId, tx_type: TransactionType, snapshot: VisibilitySnapshot) -> Self {
        Self {
            id,
            tx_type,
            snapshot,
        }
    }

    #[inline]
    pub fn id(&self) -> TxId {
        self.id
    }

    #[inline]
    pub fn tx_type(&self) -> TransactionType {
        self.tx_type
    }

    /// Highest commit id visible to this transaction.
    #[inline]
    pub fn read_pointer(&self) -> TxId {
        self.snapshot.read_pointer()
    }

    /// The visibility snapshot frozen at start time.
    pub fn snapshot(&self) -> &VisibilitySnapshot {
        &self.snapshot
    }

    /// Whether a writer id is visible to this transaction.
    ///
    /// A transaction always sees its own writes (TRANSACTIONS.md §3), even
    /// though its own id sits above its read pointer.
    pub fn is_visible(&self, write_id: TxId) -> bool {
        write_id == self.id || self.snapshot.is_visible(write_id)
    }
}

//! Write-ahead edit log
//!
//! Per PERSISTENCE.md §1-§2: the durable, fsync-on-append record of every
//! transaction state transition since the last full-state snapshot.

pub mod checksum;

mod errors;
mod record;
mod reader;
mod writer;

pub use errors::{Severity, TxLogError, TxLogErrorCode, TxLogResult};
pub use reader::TxLogReader;
pub use record::{EditKind, TxEdit, TxLogRecord, MIN_RECORD_SIZE};
pub use writer::TxLogWriter;

//! Crash recovery
//!
//! Per PERSISTENCE.md §5: snapshot load, strict edit log replay, and
//! invalidation of entries that expired during downtime.

mod errors;
mod replay;
mod startup;

pub use errors::{RecoveryError, RecoveryResult};
pub use replay::{apply_edit, replay, ReplayStats};
pub use startup::{recover, RecoveredState};

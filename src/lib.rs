//! vantage - Snapshot-isolation transaction management for distributed
//! key-value stores
//!
//! Layers multi-row, snapshot-isolation transactions on a store with no
//! native transaction support. The manager allocates globally ordered
//! transaction ids, tracks every in-progress, committed, and invalidated
//! transaction, detects write-write conflicts at commit time, persists its
//! state write-ahead, and publishes the visibility snapshots readers use to
//! classify stored versions (see TRANSACTIONS.md, PERSISTENCE.md,
//! VISIBILITY.md).

pub mod config;
pub mod manager;
pub mod observability;
pub mod persist;
pub mod recovery;
pub mod txlog;
pub mod txn;
pub mod visibility;

//! Read-side visibility filtering
//!
//! Per VISIBILITY.md: the stateless per-version decision procedure a
//! storage-engine scan adapter applies while reading raw stored versions,
//! with column TTL support and the pluggable cell-predicate capability.

mod filter;

pub use filter::{
    default_combine, CellPredicate, CombinePolicy, FilterVerdict, StoredVersion, VisibilityFilter,
};

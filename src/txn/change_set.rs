//! Change sets - the keys written by one transaction
//!
//! Per TRANSACTIONS.md §4, conflict detection is set membership only: no
//! per-key ordering, no value comparison, no merge. Keys are opaque bytes
//! produced by the client; the registry never interprets them.

use std::collections::BTreeSet;
use std::fmt;

/// An opaque row/key identifier written by a transaction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeKey(Vec<u8>);

impl ChangeKey {
    /// Creates a key from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for ChangeKey {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for ChangeKey {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<Vec<u8>> for ChangeKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{}", s),
            _ => {
                for byte in &self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeKey({})", self)
    }
}

/// The set of keys written by one transaction.
///
/// Ordered so that serialization (PERSISTENCE.md §2) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeSet<ChangeKey>);

impl ChangeSet {
    /// An empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key; returns true if it was not already present.
    pub fn insert(&mut self, key: ChangeKey) -> bool {
        self.0.insert(key)
    }

    pub fn contains(&self, key: &ChangeKey) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeKey> {
        self.0.iter()
    }

    /// First key present in both sets, if any.
    ///
    /// Iterates the smaller set and probes the larger one.
    pub fn first_overlap<'a>(&'a self, other: &'a ChangeSet) -> Option<&'a ChangeKey> {
        let (probe, lookup) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        probe.iter().find(|key| lookup.contains(key))
    }
}

impl FromIterator<ChangeKey> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = ChangeKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

//! Transaction manager configuration
//!
//! Timing knobs for expiry, commit grace (TRANSACTIONS.md §5), and the
//! maintenance schedules (TRANSACTIONS.md §7). Defaults mirror common
//! operational settings: 30 s short transactions, 24 h long transactions.

use serde::{Deserialize, Serialize};

use crate::txn::TransactionType;

/// Transaction manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxConfig {
    /// Seconds before a short transaction expires (default: 30)
    #[serde(default = "default_tx_timeout_secs")]
    pub tx_timeout_secs: u64,

    /// Seconds before a long-running transaction expires (default: 86400)
    #[serde(default = "default_long_tx_timeout_secs")]
    pub long_tx_timeout_secs: u64,

    /// Seconds between a successful canCommit and the required commit
    /// before the stage lapses (default: 10)
    #[serde(default = "default_commit_grace_secs")]
    pub commit_grace_secs: u64,

    /// Seconds between expiry sweep passes; 0 disables the background
    /// sweeper (default: 10)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds between prune passes; 0 disables the background pruner
    /// (default: 60)
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Seconds between full-state snapshots; 0 disables the background
    /// snapshot writer (default: 300)
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

fn default_tx_timeout_secs() -> u64 {
    30
}

fn default_long_tx_timeout_secs() -> u64 {
    86_400
}

fn default_commit_grace_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    10
}

fn default_prune_interval_secs() -> u64 {
    60
}

fn default_snapshot_interval_secs() -> u64 {
    300
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            tx_timeout_secs: default_tx_timeout_secs(),
            long_tx_timeout_secs: default_long_tx_timeout_secs(),
            commit_grace_secs: default_commit_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

impl TxConfig {
    /// Checks internal consistency of the timing knobs.
    pub fn validate(&self) -> Result<(), String> {
        if self.tx_timeout_secs == 0 {
            return Err("tx_timeout_secs must be greater than zero".to_string());
        }
        if self.long_tx_timeout_secs < self.tx_timeout_secs {
            return Err(
                "long_tx_timeout_secs must be at least tx_timeout_secs".to_string()
            );
        }
        Ok(())
    }

    /// Expiry timeout in milliseconds for the given transaction type.
    pub fn timeout_ms(&self, tx_type: TransactionType) -> i64 {
        let secs = match tx_type {
            TransactionType::Short => self.tx_timeout_secs,
            TransactionType::Long => self.long_tx_timeout_secs,
        };
        (secs as i64).saturating_mul(1000)
    }

    pub fn commit_grace_ms(&self) -> i64 {
        (self.commit_grace_secs as i64).saturating_mul(1000)
    }

    pub fn long_tx_timeout_ms(&self) -> i64 {
        (self.long_tx_timeout_secs as i64).saturating_mul(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TxConfig::default();
        assert_eq!(config.tx_timeout_secs, 30);
        assert_eq!(config.long_tx_timeout_secs, 86_400);
        assert_eq!(config.commit_grace_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TxConfig = serde_json::from_str(r#"{"tx_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.tx_timeout_secs, 5);
        assert_eq!(config.long_tx_timeout_secs, 86_400);
        assert_eq!(config.snapshot_interval_secs, 300);
    }

    #[test]
    fn test_timeout_selection_by_type() {
        let config = TxConfig::default();
        assert_eq!(config.timeout_ms(TransactionType::Short), 30_000);
        assert_eq!(config.timeout_ms(TransactionType::Long), 86_400_000);
    }

    #[test]
    fn test_validation_rejects_inverted_timeouts() {
        let config = TxConfig {
            tx_timeout_secs: 60,
            long_tx_timeout_secs: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TxConfig {
            tx_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

//! Wallet configuration

use crate::core::DEFAULT_DUST_THRESHOLD;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Escrow wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletConfig {
    /// Directory for watched scripts and pending transactions
    pub data_dir: PathBuf,
    /// Seconds between pending-transaction recovery passes
    pub recovery_interval_secs: u64,
    /// Upper bound on waiting for a submission's receipt
    pub receipt_timeout_secs: u64,
    /// Delay between receipt polls
    pub receipt_poll_interval_ms: u64,
    /// Gas limit for escrow contract calls
    pub gas_limit: u64,
    /// Concurrent listener deliveries
    pub max_listener_tasks: usize,
    /// Registry key of the escrow contract
    pub escrow_contract_kind: String,
    /// Amounts below this are dust
    pub dust_threshold: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".escrow_wallet"),
            recovery_interval_secs: 5,
            receipt_timeout_secs: 120,
            receipt_poll_interval_ms: 1_000,
            gas_limit: 4_000_000,
            max_listener_tasks: 64,
            escrow_contract_kind: "escrow".to_string(),
            dust_threshold: DEFAULT_DUST_THRESHOLD,
        }
    }
}

impl WalletConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let file = fs::File::open(path)?;
        let config: WalletConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the wallet cannot run with
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.recovery_interval_secs == 0 {
            return Err(StorageError::InvalidData(
                "recovery_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_listener_tasks == 0 {
            return Err(StorageError::InvalidData(
                "max_listener_tasks must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

//! Transaction shapes exchanged with the surrounding order logic
//!
//! Inputs and outputs mirror the generic wallet interface: an escrow release
//! is described as the funding records being spent (inputs) and the requested
//! payouts (outputs). Receipts, pending records and completion callbacks are
//! the wallet's view of what happened on chain.

use crate::core::address::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Currency handled by this wallet
pub const CURRENCY_CODE: &str = "ETH";

/// Default dust limit in wei
pub const DEFAULT_DUST_THRESHOLD: u64 = 10_000;

// =============================================================================
// Transaction Input
// =============================================================================

/// A funding record being spent by an escrow release
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TransactionInput {
    /// Hash of the funding transaction (hex)
    pub outpoint_hash: String,
    /// Output index within the funding transaction
    pub outpoint_index: u32,
    /// Value carried by this record
    pub value: u64,
    /// Order this record belongs to
    pub order_id: String,
}

impl TransactionInput {
    pub fn new(outpoint_hash: &str, outpoint_index: u32, value: u64) -> Self {
        Self {
            outpoint_hash: outpoint_hash.to_string(),
            outpoint_index,
            value,
            order_id: String::new(),
        }
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// A requested payout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Recipient address
    pub address: Address,
    /// Requested amount
    pub value: u64,
    /// Position hint from the caller
    pub index: u32,
    /// Order this payout settles
    pub order_id: String,
}

impl TransactionOutput {
    pub fn new(address: Address, value: u64) -> Self {
        Self {
            address,
            value,
            index: 0,
            order_id: String::new(),
        }
    }
}

// =============================================================================
// Receipt
// =============================================================================

/// Execution status reported by a mined receipt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    /// Mined, but the contract reverted
    Failed,
}

/// On-chain confirmation record for a submitted transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: u64,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

// =============================================================================
// Pending Transaction
// =============================================================================

/// A mined-but-reverted submission awaiting reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingTxn {
    /// Submitted transaction hash (record key)
    pub tx_id: TxHash,
    /// Order the submission settles
    pub order_id: String,
    /// Net amount sent
    pub amount: u64,
    /// Account nonce used for the submission
    pub nonce: u64,
    /// Sending account
    pub from: Address,
    /// Destination (escrow or plain recipient)
    pub to: Address,
    /// When the record was written
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Transaction Callback
// =============================================================================

/// Completion event delivered to transaction listeners
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionCallback {
    pub txid: TxHash,
    pub order_id: String,
    /// Payout recipient
    pub to: Address,
    pub value: u64,
    pub timestamp: DateTime<Utc>,
}

impl TransactionCallback {
    pub fn new(txid: TxHash, order_id: &str, to: Address, value: u64) -> Self {
        Self {
            txid,
            order_id: order_id.to_string(),
            to,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Event for a pending record that has now settled
    pub fn from_pending(pending: &PendingTxn) -> Self {
        Self::new(pending.tx_id, &pending.order_id, pending.to, pending.amount)
    }
}

// =============================================================================
// Fee Level
// =============================================================================

/// Requested urgency for a spend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FeeLevel {
    Economic,
    #[default]
    Normal,
    Priority,
}

impl FeeLevel {
    /// Percentage applied to the node's suggested gas price
    pub fn gas_price_percent(&self) -> u128 {
        match self {
            FeeLevel::Economic | FeeLevel::Normal => 100,
            FeeLevel::Priority => 125,
        }
    }

    /// Scale a suggested gas price for this level
    pub fn apply(&self, suggested: u128) -> u128 {
        suggested.saturating_mul(self.gas_price_percent()) / 100
    }
}

//! Core wallet types
//!
//! This module contains the fundamental building blocks:
//! - Addresses and transaction hashes
//! - Transaction inputs/outputs, receipts and pending records

pub mod address;
pub mod transaction;

pub use address::{Address, AddressError, TxHash, ADDRESS_LENGTH, HASH_LENGTH};
pub use transaction::{
    FeeLevel, PendingTxn, Receipt, ReceiptStatus, TransactionCallback, TransactionInput,
    TransactionOutput, CURRENCY_CODE, DEFAULT_DUST_THRESHOLD,
};

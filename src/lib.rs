//! Escrow Wallet: multi-party escrow payments on an Ethereum-style ledger
//!
//! This crate provides:
//! - Escrow redeem scripts with a fixed binary layout and content hash
//! - Deterministic payout aggregation shared by every signer
//! - Per-party recoverable secp256k1 signatures over escrow releases
//! - Signature combination into a single escrow contract call
//! - Spend routing with receipt polling and pending-transaction recovery
//! - JSON persistence for watched scripts and pending transactions
//!
//! # Example
//!
//! ```rust
//! use escrow_wallet::core::{TransactionInput, TransactionOutput};
//! use escrow_wallet::crypto::KeyPair;
//! use escrow_wallet::escrow::{aggregate, create_signature, RedeemScript};
//! use escrow_wallet::Address;
//!
//! let buyer = KeyPair::generate();
//! let seller = KeyPair::generate();
//! let moderator = KeyPair::generate();
//! let script = RedeemScript {
//!     unique_id: [1; 20],
//!     threshold: 2,
//!     timeout_hours: 0,
//!     buyer: buyer.address(),
//!     seller: seller.address(),
//!     moderator: moderator.address(),
//!     multisig_address: Address::new([0xec; 20]),
//!     token_address: Address::ZERO,
//! };
//!
//! let inputs = vec![TransactionInput::new("funding", 0, 100)];
//! let outputs = vec![
//!     TransactionOutput::new(seller.address(), 60),
//!     TransactionOutput::new(buyer.address(), 30),
//! ];
//!
//! // Every party computes the same payouts
//! let payouts = aggregate(&inputs, &outputs, &script.moderator).unwrap();
//! assert_eq!(payouts.total(), 100);
//!
//! let signature = create_signature(&inputs, &outputs, &seller, &script.serialize()).unwrap();
//! println!("Seller signed as {}", signature.role);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod escrow;
pub mod rpc;
pub mod storage;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use crate::core::{Address, TxHash};
pub use crypto::{ExtendedKey, KeyPair};
pub use escrow::{EscrowError, PartialSignature, RedeemScript, SignerRole};
pub use rpc::{NodeClient, Registry};
pub use storage::{JsonFileStore, MemoryStore};
pub use wallet::{EscrowWallet, WalletConfig};

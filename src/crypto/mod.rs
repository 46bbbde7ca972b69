//! Cryptographic utilities for escrow signing
//!
//! This module provides:
//! - Keccak-256 hashing
//! - secp256k1 key management with recoverable signatures
//! - Account address derivation

pub mod hash;
pub mod keys;

pub use hash::{keccak256, keccak256_concat, keccak256_hex};
pub use keys::{
    public_key_from_hex, public_key_to_address, recover_address, sign_recoverable, ExtendedKey,
    KeyError, KeyPair, CHAIN_CODE_LENGTH, SIGNATURE_LENGTH,
};

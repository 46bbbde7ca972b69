//! Keccak-256 hashing utilities
//!
//! The escrow contract, account addresses and signed-message digests all use
//! the chain's native Keccak-256 (the pre-standard SHA-3 padding).

use sha3::{Digest, Keccak256};

/// Computes the Keccak-256 hash of the input data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Computes Keccak-256 over several slices without concatenating them first
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Computes Keccak-256 and returns it as a `0x`-prefixed hex string
pub fn keccak256_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak256_hex_prefix() {
        let hex = keccak256_hex(b"hello world");
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
    }

    #[test]
    fn test_concat_matches_single_buffer() {
        let joined = keccak256(b"escrowpayload");
        let parts = keccak256_concat(&[b"escrow", b"payload"]);
        assert_eq!(joined, parts);
    }
}

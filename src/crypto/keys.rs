//! ECDSA key management for escrow signing
//!
//! Provides key pair generation, recoverable signing and public key recovery
//! using the secp256k1 curve, plus account address derivation
//! (`keccak256(uncompressed_pubkey[1..])[12..]`).

use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::keccak256;
use crate::core::Address;

/// Length of a recoverable signature: r (32) || s (32) || recovery id (1)
pub const SIGNATURE_LENGTH: usize = 65;

/// Length of an extended key chain code
pub const CHAIN_CODE_LENGTH: usize = 32;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid chain code: expected 32 bytes, got {0}")]
    InvalidChainCode(usize),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let trimmed = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = hex::decode(trimmed).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Account address controlled by this key
    pub fn address(&self) -> Address {
        public_key_to_address(&self.public_key)
    }

    /// Sign a 32-byte digest, producing `r || s || recovery_id`
    pub fn sign_recoverable(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_LENGTH], KeyError> {
        sign_recoverable(&self.secret_key, digest)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Convert a public key to an account address
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    Address::from_trailing_bytes(&hash)
}

/// Parse a public key (compressed or uncompressed) from hex
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let trimmed = hex_key.strip_prefix("0x").unwrap_or(hex_key);
    let bytes = hex::decode(trimmed).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign a 32-byte digest with a secret key
pub fn sign_recoverable(
    secret_key: &SecretKey,
    digest: &[u8; 32],
) -> Result<[u8; SIGNATURE_LENGTH], KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let signature = secp.sign_ecdsa_recoverable(&message, secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    Ok(out)
}

/// Recover the signing account from a digest and a 65-byte signature
///
/// The final byte may be either the raw recovery id (0/1) or the
/// contract-facing form (27/28).
pub fn recover_address(digest: &[u8; 32], signature: &[u8]) -> Result<Address, KeyError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(KeyError::InvalidSignature);
    }
    let v = signature[64];
    let recid = if v >= 27 { v - 27 } else { v };
    let recovery_id =
        RecoveryId::from_i32(recid as i32).map_err(|_| KeyError::InvalidSignature)?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|_| KeyError::InvalidSignature)?;

    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let public_key = secp.recover_ecdsa(&message, &recoverable)?;
    Ok(public_key_to_address(&public_key))
}

// =============================================================================
// Extended Keys
// =============================================================================

/// A key with an attached chain code, as exchanged between order parties
///
/// Only the public half is needed to build an escrow script; the chain code
/// of the first key seeds the script's unique id.
#[derive(Clone, Debug)]
pub struct ExtendedKey {
    public_key: PublicKey,
    chain_code: [u8; CHAIN_CODE_LENGTH],
}

impl ExtendedKey {
    /// Checked constructor from raw key material
    ///
    /// `key_bytes` is a 32-byte secret when `is_private`, otherwise a
    /// serialized public key.
    pub fn from_parts(
        key_bytes: &[u8],
        chain_code: &[u8],
        is_private: bool,
    ) -> Result<Self, KeyError> {
        if chain_code.len() != CHAIN_CODE_LENGTH {
            return Err(KeyError::InvalidChainCode(chain_code.len()));
        }
        let public_key = if is_private {
            let secret = SecretKey::from_slice(key_bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
            KeyPair::from_secret_key(secret).public_key
        } else {
            PublicKey::from_slice(key_bytes).map_err(|_| KeyError::InvalidPublicKey)?
        };
        let mut code = [0u8; CHAIN_CODE_LENGTH];
        code.copy_from_slice(chain_code);
        Ok(Self {
            public_key,
            chain_code: code,
        })
    }

    /// Wrap a public key with a freshly generated random chain code
    pub fn with_random_chain_code(public_key: PublicKey) -> Self {
        let mut chain_code = [0u8; CHAIN_CODE_LENGTH];
        OsRng.fill_bytes(&mut chain_code);
        Self {
            public_key,
            chain_code,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn chain_code(&self) -> &[u8; CHAIN_CODE_LENGTH] {
        &self.chain_code
    }

    pub fn address(&self) -> Address {
        public_key_to_address(&self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert_eq!(kp.private_key_hex().len(), 64);
        assert_eq!(kp.public_key_hex().len(), 66);
        assert!(!kp.address().is_zero());
    }

    #[test]
    fn test_known_address_derivation() {
        let kp = KeyPair::from_private_key_hex(
            "fad9c8855b740a0b7ed4c221dbad0f33a83a49cad6b3fe8d5817ac83d38b6a19",
        )
        .unwrap();
        assert_eq!(
            kp.address().to_hex(),
            "0x96216849c49358b10257cb55b28ea603c874b05e"
        );
    }

    #[test]
    fn test_sign_and_recover() {
        let kp = KeyPair::generate();
        let digest = keccak256(b"release escrow");

        let signature = kp.sign_recoverable(&digest).unwrap();
        assert!(signature[64] <= 1);
        assert_eq!(recover_address(&digest, &signature).unwrap(), kp.address());

        let mut contract_form = signature;
        contract_form[64] += 27;
        assert_eq!(recover_address(&digest, &contract_form).unwrap(), kp.address());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let kp = KeyPair::generate();
        let digest = keccak256(b"same payload");
        assert_eq!(
            kp.sign_recoverable(&digest).unwrap(),
            kp.sign_recoverable(&digest).unwrap()
        );
    }

    #[test]
    fn test_recover_rejects_short_signature() {
        let digest = keccak256(b"x");
        assert!(matches!(
            recover_address(&digest, &[0u8; 10]),
            Err(KeyError::InvalidSignature)
        ));
    }

    #[test]
    fn test_extended_key_checked_constructor() {
        let kp = KeyPair::generate();
        let chain_code = [9u8; 32];

        let public = ExtendedKey::from_parts(&kp.public_key.serialize(), &chain_code, false).unwrap();
        let private =
            ExtendedKey::from_parts(&kp.secret_key.secret_bytes(), &chain_code, true).unwrap();
        assert_eq!(public.address(), kp.address());
        assert_eq!(private.address(), kp.address());

        assert!(matches!(
            ExtendedKey::from_parts(&kp.public_key.serialize(), &[0u8; 16], false),
            Err(KeyError::InvalidChainCode(16))
        ));
        assert!(matches!(
            ExtendedKey::from_parts(&[1u8; 5], &chain_code, false),
            Err(KeyError::InvalidPublicKey)
        ));
    }
}

//! Key files
//!
//! A key file holds one party's signing key plus the chain code that makes
//! up its extended public key.

use crate::core::Address;
use crate::crypto::{ExtendedKey, KeyError, KeyPair, CHAIN_CODE_LENGTH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Key-file errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// Serialized key-file contents
#[derive(Debug, Serialize, Deserialize)]
struct KeyFileData {
    private_key_hex: String,
    chain_code_hex: String,
    address: Address,
    label: Option<String>,
}

/// A party's signing key and chain code
pub struct KeyFile {
    key_pair: KeyPair,
    chain_code: [u8; CHAIN_CODE_LENGTH],
    pub label: Option<String>,
}

impl KeyFile {
    /// Fresh key with a random chain code
    pub fn generate(label: Option<&str>) -> Self {
        let key_pair = KeyPair::generate();
        let extended = ExtendedKey::with_random_chain_code(key_pair.public_key);
        Self {
            key_pair,
            chain_code: *extended.chain_code(),
            label: label.map(str::to_string),
        }
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn address(&self) -> Address {
        self.key_pair.address()
    }

    /// Public half as an extended key, for script generation
    pub fn extended_public_key(&self) -> Result<ExtendedKey, KeyError> {
        ExtendedKey::from_parts(&self.key_pair.public_key.serialize(), &self.chain_code, false)
    }

    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let data = KeyFileData {
            private_key_hex: self.key_pair.private_key_hex(),
            chain_code_hex: hex::encode(self.chain_code),
            address: self.address(),
            label: self.label.clone(),
        };

        let json = serde_json::to_string_pretty(&data)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let data: KeyFileData = serde_json::from_str(&json)?;

        let key_pair = KeyPair::from_private_key_hex(&data.private_key_hex)?;
        let chain_code_bytes =
            hex::decode(&data.chain_code_hex).map_err(|_| KeyError::InvalidChainCode(0))?;
        let chain_code: [u8; CHAIN_CODE_LENGTH] = chain_code_bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidChainCode(chain_code_bytes.len()))?;

        Ok(Self {
            key_pair,
            chain_code,
            label: data.label,
        })
    }
}

//! Escrow redeem scripts
//!
//! A redeem script is the immutable set of escrow terms for one order. Its
//! fixed binary layout and its content hash are what every party (and the
//! escrow contract) agree on, so neither may ever change:
//!
//! ```text
//! <unique_id:20><threshold:1><timeout_hours:4 BE><buyer:20><seller:20>
//! <moderator:20><multisig_address:20><token_address:20>
//! ```

use crate::core::{Address, ADDRESS_LENGTH};
use crate::crypto::{keccak256, ExtendedKey};
use crate::escrow::error::EscrowError;
use crate::escrow::signing::SignerRole;
use crate::rpc::Registry;
use crate::storage::WatchedScriptIndex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serialized script length in bytes
pub const SCRIPT_LENGTH: usize = UNIQUE_ID_LENGTH + 1 + 4 + ADDRESS_LENGTH * 5;

/// Length of the order-binding unique id
pub const UNIQUE_ID_LENGTH: usize = 20;

/// Maximum number of signing parties
pub const MAX_PARTIES: usize = 3;

const SECONDS_PER_HOUR: u64 = 3600;

/// Escrow terms for a single order
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedeemScript {
    /// Binds the script to one order
    pub unique_id: [u8; UNIQUE_ID_LENGTH],
    /// Signatures required to release funds (1-3)
    pub threshold: u8,
    /// Hours until the timeout key may release alone; 0 disables
    pub timeout_hours: u32,
    pub buyer: Address,
    pub seller: Address,
    /// Zero when threshold == 1
    pub moderator: Address,
    /// Escrow contract instance governing this script
    pub multisig_address: Address,
    /// ERC20-style token, zero for native currency
    pub token_address: Address,
}

impl RedeemScript {
    /// Validate parameters and assemble a script from party keys
    ///
    /// keys[0] is the buyer, keys[1] the seller and keys[2] (required when
    /// `threshold > 1`) the moderator. The unique id is taken from the
    /// trailing bytes of the buyer key's chain code.
    pub fn build(
        keys: &[ExtendedKey],
        threshold: usize,
        timeout: Duration,
        timeout_key: Option<&ExtendedKey>,
        multisig_address: Address,
    ) -> Result<Self, EscrowError> {
        let timeout_hours = u32::try_from(timeout.as_secs() / SECONDS_PER_HOUR).unwrap_or(u32::MAX);
        if timeout_hours > 0 && timeout_key.is_none() {
            return Err(EscrowError::MissingTimeoutKey);
        }

        if threshold == 0 || threshold > MAX_PARTIES {
            return Err(EscrowError::InvalidThreshold(format!(
                "threshold must be between 1 and {}, got {}",
                MAX_PARTIES, threshold
            )));
        }

        if keys.len() < 2 || keys.len() < threshold {
            return Err(EscrowError::InvalidThreshold(format!(
                "unable to generate multisig script with {} required signatures \
                 when there are only {} public keys available",
                threshold,
                keys.len()
            )));
        }

        if threshold > 1 && keys.len() < MAX_PARTIES {
            return Err(EscrowError::InvalidThreshold(format!(
                "threshold {} requires a moderator key",
                threshold
            )));
        }

        let parties: Vec<Address> = keys.iter().map(|k| k.address()).collect();
        let moderator = if threshold > 1 { parties[2] } else { Address::ZERO };

        let mut unique_id = [0u8; UNIQUE_ID_LENGTH];
        unique_id.copy_from_slice(Address::from_trailing_bytes(keys[0].chain_code()).as_bytes());

        Ok(Self {
            unique_id,
            threshold: threshold as u8,
            timeout_hours,
            buyer: parties[0],
            seller: parties[1],
            moderator,
            multisig_address,
            token_address: Address::ZERO,
        })
    }

    /// Fixed-order binary encoding
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SCRIPT_LENGTH);
        out.extend_from_slice(&self.unique_id);
        out.push(self.threshold);
        out.extend_from_slice(&self.timeout_hours.to_be_bytes());
        out.extend_from_slice(self.buyer.as_bytes());
        out.extend_from_slice(self.seller.as_bytes());
        out.extend_from_slice(self.moderator.as_bytes());
        out.extend_from_slice(self.multisig_address.as_bytes());
        out.extend_from_slice(self.token_address.as_bytes());
        out
    }

    /// Decode the fixed-order binary encoding
    pub fn deserialize(bytes: &[u8]) -> Result<Self, EscrowError> {
        if bytes.len() != SCRIPT_LENGTH {
            return Err(EscrowError::MalformedScript(format!(
                "expected {} bytes, got {}",
                SCRIPT_LENGTH,
                bytes.len()
            )));
        }

        let mut unique_id = [0u8; UNIQUE_ID_LENGTH];
        unique_id.copy_from_slice(&bytes[..UNIQUE_ID_LENGTH]);
        let threshold = bytes[UNIQUE_ID_LENGTH];
        let mut timeout = [0u8; 4];
        timeout.copy_from_slice(&bytes[UNIQUE_ID_LENGTH + 1..UNIQUE_ID_LENGTH + 5]);

        // Five consecutive addresses follow the fixed header
        let header = UNIQUE_ID_LENGTH + 5;
        let address = |slot: usize| {
            let start = header + slot * ADDRESS_LENGTH;
            Address::from_slice(&bytes[start..start + ADDRESS_LENGTH])
                .map_err(|e| EscrowError::MalformedScript(e.to_string()))
        };
        let buyer = address(0)?;
        let seller = address(1)?;
        let moderator = address(2)?;
        let multisig_address = address(3)?;
        let token_address = address(4)?;

        if threshold == 0 || threshold as usize > MAX_PARTIES {
            return Err(EscrowError::MalformedScript(format!(
                "threshold {} out of range",
                threshold
            )));
        }

        Ok(Self {
            unique_id,
            threshold,
            timeout_hours: u32::from_be_bytes(timeout),
            buyer,
            seller,
            moderator,
            multisig_address,
            token_address,
        })
    }

    /// Decode a hex-encoded script (with or without `0x`)
    pub fn from_hex(s: &str) -> Result<Self, EscrowError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(trimmed).map_err(|e| EscrowError::MalformedScript(e.to_string()))?;
        Self::deserialize(&bytes)
    }

    /// Content hash the escrow contract uses as the script's identity
    ///
    /// keccak256(unique_id || threshold || timeout_hours(BE) || buyer ||
    /// seller || moderator || multisig_address). The token address is not
    /// part of the hash.
    pub fn content_hash(&self) -> ([u8; 32], String) {
        let mut preimage = Vec::with_capacity(UNIQUE_ID_LENGTH + 1 + 4 + ADDRESS_LENGTH * 4);
        preimage.extend_from_slice(&self.unique_id);
        preimage.push(self.threshold);
        preimage.extend_from_slice(&self.timeout_hours.to_be_bytes());
        preimage.extend_from_slice(self.buyer.as_bytes());
        preimage.extend_from_slice(self.seller.as_bytes());
        preimage.extend_from_slice(self.moderator.as_bytes());
        preimage.extend_from_slice(self.multisig_address.as_bytes());

        let hash = keccak256(&preimage);
        (hash, format!("0x{}", hex::encode(hash)))
    }

    /// Content address of the script: trailing 20 bytes of keccak256(serialized)
    pub fn escrow_address(&self) -> Address {
        Address::from_trailing_bytes(&keccak256(&self.serialize()))
    }

    /// Address of the party holding `role`, if that role exists in this script
    pub fn party(&self, role: SignerRole) -> Option<Address> {
        match role {
            SignerRole::Buyer => Some(self.buyer),
            SignerRole::Seller => Some(self.seller),
            SignerRole::Moderator if self.threshold > 1 && !self.moderator.is_zero() => {
                Some(self.moderator)
            }
            SignerRole::Moderator => None,
        }
    }

    /// Role held by `address` in this script
    pub fn role_of(&self, address: &Address) -> Option<SignerRole> {
        [SignerRole::Buyer, SignerRole::Seller, SignerRole::Moderator]
            .into_iter()
            .find(|role| self.party(*role).as_ref() == Some(address))
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        let parties = if self.moderator.is_zero() { 2 } else { 3 };
        format!("{}-of-{}", self.threshold, parties)
    }
}

/// Build a script, register it as watched and return its address and bytes
///
/// The escrow contract implementation comes from the registry; a zero
/// address means no escrow contract is deployed.
pub async fn generate(
    keys: &[ExtendedKey],
    threshold: usize,
    timeout: Duration,
    timeout_key: Option<&ExtendedKey>,
    registry: &dyn Registry,
    contract_kind: &str,
    index: &WatchedScriptIndex,
) -> Result<(Address, Vec<u8>), EscrowError> {
    // Validate before touching the registry
    RedeemScript::build(keys, threshold, timeout, timeout_key, Address::ZERO)?;

    let implementation = registry
        .recommended_implementation(contract_kind)
        .await
        .map_err(EscrowError::Registry)?;
    if implementation.is_zero() {
        return Err(EscrowError::NoEscrowContract);
    }

    let script = RedeemScript::build(keys, threshold, timeout, timeout_key, implementation)?;
    let serialized = script.serialize();
    let address = script.escrow_address();

    index.put(address, &serialized)?;
    log::info!(
        "Generated {} escrow {} on contract {}",
        script.description(),
        address,
        implementation
    );

    Ok((address, serialized))
}

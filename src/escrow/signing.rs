//! Escrow release signing
//!
//! Each party signs the same message digest independently. The digest is
//! exactly what the escrow contract recomputes on `execute`:
//!
//! ```text
//! payload_hash = keccak256(0x19 || 0x00 || multisig_address || destinations
//!                          || amounts || script_hash)
//! message_hash = keccak256("\x19Ethereum Signed Message:\n32" || payload_hash)
//! ```
//!
//! `destinations` holds each address right-aligned in a 32-byte slot and
//! `amounts` holds each amount as 8 big-endian bytes at offset 24 of a 32-byte
//! slot, both in payout address order.

use crate::core::{Address, TransactionInput, TransactionOutput};
use crate::crypto::{keccak256, keccak256_concat, recover_address, KeyPair, SIGNATURE_LENGTH};
use crate::escrow::error::EscrowError;
use crate::escrow::payout::{aggregate, Payouts};
use crate::escrow::script::RedeemScript;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signed-message prefix including the 32-byte length marker
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Width of one ABI slot
const SLOT: usize = 32;

/// Offset of the 8-byte amount within its slot
const AMOUNT_OFFSET: usize = SLOT - 8;

/// Offset added to the raw recovery id for the contract's `v`
const V_OFFSET: u8 = 27;

/// Party role within an escrow
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SignerRole {
    Buyer,
    Seller,
    Moderator,
}

impl fmt::Display for SignerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignerRole::Buyer => "buyer",
            SignerRole::Seller => "seller",
            SignerRole::Moderator => "moderator",
        };
        f.write_str(name)
    }
}

/// A single party's signature over an escrow release
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialSignature {
    /// Role of the signer within the script
    pub role: SignerRole,
    /// r || s || recovery id (hex)
    pub signature: String,
    /// When the signature was produced
    pub signed_at: DateTime<Utc>,
}

impl PartialSignature {
    pub fn new(role: SignerRole, signature: &[u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            role,
            signature: hex::encode(signature),
            signed_at: Utc::now(),
        }
    }

    /// Raw 65-byte signature
    pub fn bytes(&self) -> Result<Vec<u8>, EscrowError> {
        let bytes = hex::decode(&self.signature)
            .map_err(|_| EscrowError::Signing(crate::crypto::KeyError::InvalidSignature))?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(EscrowError::Signing(crate::crypto::KeyError::InvalidSignature));
        }
        Ok(bytes)
    }

    /// Split into the contract's (r, s, v) form, with v = recovery id + 27
    pub fn rsv(&self) -> Result<([u8; 32], [u8; 32], u8), EscrowError> {
        let bytes = self.bytes()?;
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let recid = bytes[64];
        let v = if recid >= V_OFFSET { recid } else { recid + V_OFFSET };
        Ok((r, s, v))
    }

    /// Account that produced this signature over `message_hash`
    pub fn recover(&self, message_hash: &[u8; 32]) -> Result<Address, EscrowError> {
        Ok(recover_address(message_hash, &self.bytes()?)?)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Destination addresses, each right-aligned in a 32-byte slot
pub fn encode_destinations(payouts: &Payouts) -> Vec<u8> {
    let mut out = Vec::with_capacity(payouts.len() * SLOT);
    for line in payouts.lines() {
        let mut slot = [0u8; SLOT];
        slot[SLOT - 20..].copy_from_slice(line.destination.as_bytes());
        out.extend_from_slice(&slot);
    }
    out
}

/// Amounts, each as 8 big-endian bytes at offset 24 of a 32-byte slot
pub fn encode_amounts(payouts: &Payouts) -> Vec<u8> {
    let mut out = Vec::with_capacity(payouts.len() * SLOT);
    for line in payouts.lines() {
        let mut slot = [0u8; SLOT];
        slot[AMOUNT_OFFSET..].copy_from_slice(&line.value.to_be_bytes());
        out.extend_from_slice(&slot);
    }
    out
}

/// Verification preimage the escrow contract hashes
pub fn payload_preimage(script: &RedeemScript, payouts: &Payouts) -> Vec<u8> {
    let (script_hash, _) = script.content_hash();
    let destinations = encode_destinations(payouts);
    let amounts = encode_amounts(payouts);

    let mut payload = Vec::with_capacity(2 + 20 + destinations.len() + amounts.len() + 32);
    payload.push(0x19);
    payload.push(0x00);
    payload.extend_from_slice(script.multisig_address.as_bytes());
    payload.extend_from_slice(&destinations);
    payload.extend_from_slice(&amounts);
    payload.extend_from_slice(&script_hash);
    payload
}

/// keccak256 of the verification preimage
pub fn payload_hash(script: &RedeemScript, payouts: &Payouts) -> [u8; 32] {
    keccak256(&payload_preimage(script, payouts))
}

/// Digest every signer signs
pub fn message_hash(script: &RedeemScript, payouts: &Payouts) -> [u8; 32] {
    let payload = payload_hash(script, payouts);
    keccak256_concat(&[SIGNED_MESSAGE_PREFIX, &payload])
}

// =============================================================================
// Signing
// =============================================================================

/// Sign a release of `payouts` under `script` with the local key
///
/// The signer's role is derived from its address; a key that is not a party
/// to the script cannot sign.
pub fn sign_payouts(
    key_pair: &KeyPair,
    script: &RedeemScript,
    payouts: &Payouts,
) -> Result<PartialSignature, EscrowError> {
    let address = key_pair.address();
    let role = script
        .role_of(&address)
        .ok_or(EscrowError::UnknownSigner(address))?;

    let digest = message_hash(script, payouts);
    let signature = key_pair.sign_recoverable(&digest)?;

    log::debug!(
        "Signed escrow release as {} for {} destinations",
        role,
        payouts.len()
    );
    Ok(PartialSignature::new(role, &signature))
}

/// Produce this party's signature for releasing an escrow
///
/// Payouts are always recomputed locally from the inputs and outputs.
pub fn create_signature(
    inputs: &[TransactionInput],
    outputs: &[TransactionOutput],
    key_pair: &KeyPair,
    redeem_script: &[u8],
) -> Result<PartialSignature, EscrowError> {
    let script = RedeemScript::deserialize(redeem_script)?;
    let payouts = aggregate(inputs, outputs, &script.moderator)?;
    sign_payouts(key_pair, &script, &payouts)
}

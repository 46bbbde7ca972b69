//! Escrow error taxonomy

use crate::core::{Address, TxHash};
use crate::crypto::KeyError;
use crate::escrow::signing::SignerRole;
use crate::rpc::NodeError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors related to escrow scripting, signing and settlement
#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Timeout key must be provided when using an escrow timeout")]
    MissingTimeoutKey,
    #[error("No escrow contract available")]
    NoEscrowContract,
    #[error("Malformed redeem script: {0}")]
    MalformedScript(String),
    #[error("Payout greater than initial amount: outputs {outputs}, inputs {inputs}")]
    OverPayout { inputs: u64, outputs: u64 },
    #[error("Payout does not match funded amount: outputs {outputs}, inputs {inputs}")]
    PayoutMismatch { inputs: u64, outputs: u64 },
    #[error("Amount overflow while totalling {0}")]
    AmountOverflow(&'static str),
    #[error("Signing error: {0}")]
    Signing(#[from] KeyError),
    #[error("Signer {0} is not a party to this escrow")]
    UnknownSigner(Address),
    #[error("Duplicate signature for role {0}")]
    DuplicateSigner(SignerRole),
    #[error("Signature for role {role} was produced by {recovered}, expected {expected}")]
    SignatureMismatch {
        role: SignerRole,
        expected: Address,
        recovered: Address,
    },
    #[error("Insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures { have: usize, need: u8 },
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    #[error("Registry lookup failed: {0}")]
    Registry(NodeError),
    #[error("Submission failed: {0}")]
    Submission(NodeError),
    #[error("Transaction pending: {0}")]
    TransactionPending(TxHash),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EscrowError {
    /// Settlement was deferred to the recovery loop; callers must not resubmit
    pub fn is_pending(&self) -> bool {
        matches!(self, EscrowError::TransactionPending(_))
    }
}

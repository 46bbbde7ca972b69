//! Node RPC client interface
//!
//! The wallet never talks to a chain node directly; every node interaction
//! goes through [`NodeClient`], so the transport (HTTP, IPC, a test double)
//! stays swappable.

use crate::core::{Address, Receipt, TxHash};
use crate::escrow::EscrowCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node interaction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Node unavailable: {0}")]
    Unavailable(String),
}

/// Envelope parameters for an outgoing transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxParams {
    pub from: Address,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Native value carried by the transaction
    pub value: u64,
}

/// A transaction accepted by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub hash: TxHash,
    /// Signed, serialized transaction as broadcast
    pub raw: Vec<u8>,
}

/// Chain node operations the wallet depends on
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn balance(&self, account: &Address) -> Result<u64, NodeError>;

    /// Next nonce for `account`, counting transactions still in the pool
    async fn pending_nonce(&self, account: &Address) -> Result<u64, NodeError>;

    async fn suggest_gas_price(&self) -> Result<u128, NodeError>;

    /// Gas needed to move `value` from `from` to `to`
    async fn estimate_gas(&self, from: &Address, to: &Address, value: u64)
        -> Result<u64, NodeError>;

    /// Receipt of a mined transaction, `None` while it is unmined or unknown
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, NodeError>;

    /// Sign and broadcast a plain value transfer
    async fn transfer(&self, to: &Address, params: &TxParams) -> Result<SubmittedTx, NodeError>;

    /// Sign and broadcast a call to an escrow contract
    async fn submit_contract_call(
        &self,
        contract: &Address,
        call: &EscrowCall,
        params: &TxParams,
    ) -> Result<SubmittedTx, NodeError>;
}

//! In-process node double for tests

use crate::core::{Address, Receipt, ReceiptStatus, TxHash};
use crate::crypto::keccak256;
use crate::escrow::EscrowCall;
use crate::rpc::{NodeClient, NodeError, SubmittedTx, TxParams};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A transaction the mock accepted
#[derive(Debug, Clone)]
pub enum Submission {
    Transfer {
        to: Address,
        params: TxParams,
    },
    Contract {
        contract: Address,
        call: EscrowCall,
        params: TxParams,
    },
}

impl Submission {
    pub fn params(&self) -> &TxParams {
        match self {
            Submission::Transfer { params, .. } | Submission::Contract { params, .. } => params,
        }
    }
}

struct MockState {
    balance: u64,
    nonce: u64,
    gas_price: u128,
    gas_estimate: u64,
    /// Status given to receipts of newly submitted transactions
    next_status: Option<ReceiptStatus>,
    receipts: HashMap<TxHash, Option<ReceiptStatus>>,
    receipt_queries: usize,
    submissions: Vec<Submission>,
    fail_submissions: bool,
}

/// Scriptable [`NodeClient`] that records everything submitted to it
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                balance: 0,
                nonce: 0,
                gas_price: 1_000,
                gas_estimate: 21_000,
                next_status: Some(ReceiptStatus::Success),
                receipts: HashMap::new(),
                receipt_queries: 0,
                submissions: Vec::new(),
                fail_submissions: false,
            }),
        }
    }

    pub fn set_balance(&self, balance: u64) {
        self.state.lock().unwrap().balance = balance;
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state.lock().unwrap().gas_price = gas_price;
    }

    /// Receipt status for subsequent submissions; `None` never mines them
    pub fn mine_next_as(&self, status: Option<ReceiptStatus>) {
        self.state.lock().unwrap().next_status = status;
    }

    /// Override the receipt of an already known or foreign transaction
    pub fn set_receipt(&self, hash: TxHash, status: Option<ReceiptStatus>) {
        self.state.lock().unwrap().receipts.insert(hash, status);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.state.lock().unwrap().fail_submissions = fail;
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn receipt_queries(&self) -> usize {
        self.state.lock().unwrap().receipt_queries
    }

    fn record(&self, submission: Submission) -> Result<SubmittedTx, NodeError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            return Err(NodeError::Rpc("submission rejected".to_string()));
        }

        let sequence = state.submissions.len() as u64;
        let hash = TxHash::new(keccak256(&sequence.to_be_bytes()));
        let status = state.next_status;
        state.receipts.insert(hash, status);
        state.submissions.push(submission);
        state.nonce += 1;

        Ok(SubmittedTx {
            hash,
            raw: hash.as_bytes().to_vec(),
        })
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn balance(&self, _account: &Address) -> Result<u64, NodeError> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn pending_nonce(&self, _account: &Address) -> Result<u64, NodeError> {
        Ok(self.state.lock().unwrap().nonce)
    }

    async fn suggest_gas_price(&self) -> Result<u128, NodeError> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn estimate_gas(
        &self,
        _from: &Address,
        _to: &Address,
        _value: u64,
    ) -> Result<u64, NodeError> {
        Ok(self.state.lock().unwrap().gas_estimate)
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, NodeError> {
        let mut state = self.state.lock().unwrap();
        state.receipt_queries += 1;
        let status = state.receipts.get(hash).copied().flatten();
        Ok(status.map(|status| Receipt {
            tx_hash: *hash,
            status,
            block_number: 1,
        }))
    }

    async fn transfer(&self, to: &Address, params: &TxParams) -> Result<SubmittedTx, NodeError> {
        self.record(Submission::Transfer {
            to: *to,
            params: *params,
        })
    }

    async fn submit_contract_call(
        &self,
        contract: &Address,
        call: &EscrowCall,
        params: &TxParams,
    ) -> Result<SubmittedTx, NodeError> {
        self.record(Submission::Contract {
            contract: *contract,
            call: call.clone(),
            params: *params,
        })
    }
}

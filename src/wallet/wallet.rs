//! Escrow wallet
//!
//! Ties the escrow engine to a node, a contract registry and the wallet's
//! persistent stores. One wallet owns one signing key.

use crate::core::{
    Address, FeeLevel, PendingTxn, Receipt, TransactionCallback, TransactionInput,
    TransactionOutput, TxHash, CURRENCY_CODE,
};
use crate::crypto::{ExtendedKey, KeyPair};
use crate::escrow::{
    self, build_release_call, create_signature, submit_call, EscrowCall, EscrowError,
    PartialSignature, RedeemScript, ReleaseRequest,
};
use crate::rpc::{NodeClient, Registry, TxParams};
use crate::storage::{Datastore, PendingTxnStore, WatchedScriptIndex};
use crate::wallet::config::WalletConfig;
use crate::wallet::listeners::ListenerRegistry;
use crate::wallet::recovery::{RecoveryHandle, RecoveryLoop};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How a spend was routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendRoute {
    /// Plain value transfer to the destination
    Transfer,
    /// Funding call on the escrow contract behind a watched escrow address
    Escrow(RedeemScript),
}

/// Escrow-capable wallet for a single account
pub struct EscrowWallet {
    config: WalletConfig,
    key_pair: KeyPair,
    node: Arc<dyn NodeClient>,
    registry: Arc<dyn Registry>,
    index: WatchedScriptIndex,
    pending: Arc<dyn PendingTxnStore>,
    listeners: Arc<ListenerRegistry>,
    recovery: Mutex<Option<RecoveryHandle>>,
}

impl EscrowWallet {
    /// Open a wallet over `store`, indexing its watched scripts
    pub fn new<S>(
        config: WalletConfig,
        key_pair: KeyPair,
        node: Arc<dyn NodeClient>,
        registry: Arc<dyn Registry>,
        store: Arc<S>,
    ) -> Result<Self, EscrowError>
    where
        S: Datastore + 'static,
    {
        let index = WatchedScriptIndex::load(store.clone())?;
        let listeners = Arc::new(ListenerRegistry::new(config.max_listener_tasks));
        log::info!(
            "Opened escrow wallet {} ({} watched scripts)",
            key_pair.address(),
            index.len()?
        );

        Ok(Self {
            config,
            key_pair,
            node,
            registry,
            index,
            pending: store,
            listeners,
            recovery: Mutex::new(None),
        })
    }

    pub fn address(&self) -> Address {
        self.key_pair.address()
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn currency_code(&self) -> &'static str {
        CURRENCY_CODE
    }

    pub fn is_dust(&self, amount: u64) -> bool {
        amount < self.config.dust_threshold
    }

    /// Confirmed node balance of the wallet account
    pub async fn balance(&self) -> Result<u64, EscrowError> {
        Ok(self.node.balance(&self.address()).await?)
    }

    /// Sum of the node's gas estimates for sending each output
    pub async fn estimate_fee(&self, outputs: &[TransactionOutput]) -> Result<u64, EscrowError> {
        let from = self.address();
        let mut total = 0u64;
        for output in outputs {
            let gas = self
                .node
                .estimate_gas(&from, &output.address, output.value)
                .await?;
            total = total
                .checked_add(gas)
                .ok_or(EscrowError::AmountOverflow("fee estimate"))?;
        }
        Ok(total)
    }

    pub async fn add_transaction_listener<F>(&self, listener: F)
    where
        F: Fn(TransactionCallback) + Send + Sync + 'static,
    {
        self.listeners.register(listener).await;
    }

    // =========================================================================
    // Escrow operations
    // =========================================================================

    /// Create an escrow script for `keys` and start watching its address
    pub async fn generate_escrow(
        &self,
        keys: &[ExtendedKey],
        threshold: usize,
        timeout: Duration,
        timeout_key: Option<&ExtendedKey>,
    ) -> Result<(Address, Vec<u8>), EscrowError> {
        escrow::generate(
            keys,
            threshold,
            timeout,
            timeout_key,
            self.registry.as_ref(),
            &self.config.escrow_contract_kind,
            &self.index,
        )
        .await
    }

    /// Sign a release with `key`
    pub fn create_partial_signature(
        &self,
        inputs: &[TransactionInput],
        outputs: &[TransactionOutput],
        key: &KeyPair,
        redeem_script: &[u8],
    ) -> Result<PartialSignature, EscrowError> {
        create_signature(inputs, outputs, key, redeem_script)
    }

    /// Combine one or two partial signatures into a release
    ///
    /// Returns the node's raw transaction when broadcasting, otherwise the
    /// JSON-encoded `execute` call.
    pub async fn combine_signatures(
        &self,
        inputs: &[TransactionInput],
        outputs: &[TransactionOutput],
        first: PartialSignature,
        second: Option<PartialSignature>,
        redeem_script: &[u8],
        broadcast: bool,
    ) -> Result<Vec<u8>, EscrowError> {
        let mut signatures = vec![first];
        signatures.extend(second);

        let request = ReleaseRequest {
            inputs,
            outputs,
            signatures: &signatures,
            redeem_script,
        };
        escrow::combine(
            self.node.as_ref(),
            self.address(),
            self.config.gas_limit,
            &request,
            broadcast,
        )
        .await
    }

    /// Pay every input of an escrow back to this wallet with one signature
    ///
    /// Only scripts whose threshold a single signature meets can be swept.
    pub async fn sweep_address(
        &self,
        inputs: &[TransactionInput],
        key: &KeyPair,
        redeem_script: &[u8],
    ) -> Result<TxHash, EscrowError> {
        let script = RedeemScript::deserialize(redeem_script)?;
        let outputs: Vec<TransactionOutput> = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| TransactionOutput {
                address: self.address(),
                value: input.value,
                index: i as u32,
                order_id: input.order_id.clone(),
            })
            .collect();

        let signature = create_signature(&[], &outputs, key, redeem_script)?;
        let call = build_release_call(&[], &outputs, &[signature], &script)?;
        let submitted = submit_call(
            self.node.as_ref(),
            self.address(),
            self.config.gas_limit,
            &script.multisig_address,
            &call,
        )
        .await?;
        Ok(submitted.hash)
    }

    // =========================================================================
    // Spend
    // =========================================================================

    /// Decide how a spend to `destination` is submitted
    pub fn route(
        &self,
        destination: &Address,
        reference_id: Option<&str>,
    ) -> Result<SpendRoute, EscrowError> {
        if reference_id.is_none() {
            return Ok(SpendRoute::Transfer);
        }
        match self.index.resolve(destination)? {
            Some(bytes) => Ok(SpendRoute::Escrow(RedeemScript::deserialize(&bytes)?)),
            None => Ok(SpendRoute::Transfer),
        }
    }

    /// Send `amount` to `destination`
    ///
    /// Without a reference id this is a plain transfer and the hash is
    /// returned as soon as the node accepts it. With a reference id the spend
    /// is linked to an order: watched escrow addresses are funded through the
    /// escrow contract, and the receipt is awaited. A mined-but-failed
    /// submission is recorded for the recovery loop and reported as
    /// [`EscrowError::TransactionPending`]; callers must not resubmit it.
    pub async fn spend(
        &self,
        amount: u64,
        destination: Address,
        fee_level: FeeLevel,
        reference_id: Option<&str>,
    ) -> Result<TxHash, EscrowError> {
        let route = self.route(&destination, reference_id)?;
        let from = self.address();
        let nonce = self.node.pending_nonce(&from).await?;
        let gas_price = fee_level.apply(self.node.suggest_gas_price().await?);

        let submitted = match &route {
            SpendRoute::Transfer => {
                let gas_limit = self.node.estimate_gas(&from, &destination, amount).await?;
                let params = TxParams {
                    from,
                    nonce,
                    gas_price,
                    gas_limit,
                    value: amount,
                };
                self.node
                    .transfer(&destination, &params)
                    .await
                    .map_err(EscrowError::Submission)?
            }
            SpendRoute::Escrow(script) => {
                let call = EscrowCall::fund(script, amount);
                let params = TxParams {
                    from,
                    nonce,
                    gas_price,
                    gas_limit: self.config.gas_limit,
                    value: call.value(),
                };
                self.node
                    .submit_contract_call(&script.multisig_address, &call, &params)
                    .await
                    .map_err(EscrowError::Submission)?
            }
        };
        let hash = submitted.hash;

        let order_id = match reference_id {
            Some(order_id) => order_id,
            None => {
                log::info!("Transferred {} to {} in {}", amount, destination, hash);
                return Ok(hash);
            }
        };
        log::info!(
            "Spend for order {} routed as {} in {}",
            order_id,
            match route {
                SpendRoute::Transfer => "transfer",
                SpendRoute::Escrow(_) => "escrow funding",
            },
            hash
        );

        match self.await_receipt(&hash).await {
            Some(receipt) if receipt.is_success() => {
                let event = TransactionCallback::new(hash, order_id, destination, amount);
                // Delivery completes in the background
                let _ = self.listeners.notify_all(event).await;
                Ok(hash)
            }
            Some(_) => {
                let record = PendingTxn {
                    tx_id: hash,
                    order_id: order_id.to_string(),
                    amount,
                    nonce,
                    from,
                    to: destination,
                    created_at: Utc::now(),
                };
                self.pending.put_pending(&record)?;
                log::warn!(
                    "Transaction {} for order {} failed on chain; recorded as pending",
                    hash,
                    order_id
                );
                Err(EscrowError::TransactionPending(hash))
            }
            None => {
                log::warn!(
                    "No receipt for {} within {:?}",
                    hash,
                    self.config.receipt_timeout()
                );
                Ok(hash)
            }
        }
    }

    /// Poll for a receipt until one arrives or the configured timeout passes
    pub async fn await_receipt(&self, hash: &TxHash) -> Option<Receipt> {
        let poll_interval = self.config.receipt_poll_interval();
        let poll = async {
            loop {
                match self.node.transaction_receipt(hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => log::error!("Error fetching receipt for {}: {}", hash, e),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(self.config.receipt_timeout(), poll)
            .await
            .ok()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the pending-transaction recovery loop; no-op if running
    pub async fn start(&self) {
        let mut recovery = self.recovery.lock().await;
        if recovery.is_some() {
            return;
        }
        let task = RecoveryLoop::new(
            self.node.clone(),
            self.pending.clone(),
            self.listeners.clone(),
            self.config.recovery_interval(),
        );
        *recovery = Some(task.spawn());
    }

    /// Stop the recovery loop and wait for it to exit
    pub async fn stop(&self) {
        let handle = self.recovery.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.recovery
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

//! Pending-transaction recovery loop
//!
//! Escrow submissions that were mined with a failed status are recorded as
//! pending. A background task periodically re-checks their receipts; once a
//! receipt reports success the record is removed and listeners are told the
//! transaction completed.

use crate::core::{PendingTxn, TransactionCallback};
use crate::rpc::NodeClient;
use crate::storage::PendingTxnStore;
use crate::wallet::listeners::ListenerRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Result of checking one pending record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Receipt succeeded; record removed and listeners notified
    Settled,
    /// Receipt succeeded but another check already removed the record
    AlreadySettled,
    /// Receipt still reports failure
    StillFailed,
    /// No receipt yet
    Unmined,
    /// Node or store error; retried next cycle
    Errored,
}

/// Periodic reconciliation of pending escrow submissions
#[derive(Clone)]
pub struct RecoveryLoop {
    node: Arc<dyn NodeClient>,
    store: Arc<dyn PendingTxnStore>,
    listeners: Arc<ListenerRegistry>,
    interval: Duration,
}

/// Running recovery task
pub struct RecoveryHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl RecoveryHandle {
    /// Signal the task to stop and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            log::error!("Recovery task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl RecoveryLoop {
    pub fn new(
        node: Arc<dyn NodeClient>,
        store: Arc<dyn PendingTxnStore>,
        listeners: Arc<ListenerRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            node,
            store,
            listeners,
            interval,
        }
    }

    /// Start the loop on the current runtime
    pub fn spawn(self) -> RecoveryHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            log::info!("Recovery loop started ({:?} interval)", self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        log::info!("Recovery loop shutting down...");
                        break;
                    }
                }
            }
        });

        RecoveryHandle { shutdown_tx, join }
    }

    /// One pass: spawn a check for every pending record
    pub async fn run_cycle(&self) -> Vec<JoinHandle<CheckOutcome>> {
        let records = match self.store.pending() {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to list pending transactions: {}", e);
                return Vec::new();
            }
        };

        records
            .into_iter()
            .map(|record| {
                let node = self.node.clone();
                let store = self.store.clone();
                let listeners = self.listeners.clone();
                tokio::spawn(async move {
                    check_pending(node.as_ref(), store.as_ref(), &listeners, record).await
                })
            })
            .collect()
    }
}

/// Re-check one pending record
pub async fn check_pending(
    node: &dyn NodeClient,
    store: &dyn PendingTxnStore,
    listeners: &ListenerRegistry,
    record: PendingTxn,
) -> CheckOutcome {
    let receipt = match node.transaction_receipt(&record.tx_id).await {
        Ok(Some(receipt)) => receipt,
        Ok(None) => return CheckOutcome::Unmined,
        Err(e) => {
            log::warn!("Receipt check for {} failed: {}", record.tx_id, e);
            return CheckOutcome::Errored;
        }
    };

    if !receipt.is_success() {
        return CheckOutcome::StillFailed;
    }

    match store.delete_pending(&record.tx_id) {
        Ok(true) => {}
        Ok(false) => return CheckOutcome::AlreadySettled,
        Err(e) => {
            log::error!("Failed to delete pending transaction {}: {}", record.tx_id, e);
            return CheckOutcome::Errored;
        }
    }

    log::info!(
        "Pending transaction {} for order {} settled",
        record.tx_id,
        record.order_id
    );
    for handle in listeners
        .notify_all(TransactionCallback::from_pending(&record))
        .await
    {
        if let Err(e) = handle.await {
            log::error!("Transaction listener panicked: {}", e);
        }
    }
    CheckOutcome::Settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, ReceiptStatus, TxHash};
    use crate::storage::MemoryStore;
    use crate::testutil::MockNode;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(byte: u8) -> PendingTxn {
        PendingTxn {
            tx_id: TxHash::new([byte; 32]),
            order_id: format!("order-{}", byte),
            amount: 500,
            nonce: 3,
            from: Address::new([0x01; 20]),
            to: Address::new([0x02; 20]),
            created_at: Utc::now(),
        }
    }

    struct Harness {
        node: Arc<MockNode>,
        store: Arc<MemoryStore>,
        listeners: Arc<ListenerRegistry>,
        counters: Vec<Arc<AtomicUsize>>,
    }

    impl Harness {
        /// Deliveries seen by each registered listener
        fn notifications(&self) -> Vec<usize> {
            self.counters
                .iter()
                .map(|c| c.load(Ordering::SeqCst))
                .collect()
        }
    }

    async fn harness() -> Harness {
        let listeners = Arc::new(ListenerRegistry::new(4));
        let mut counters = Vec::new();
        for _ in 0..2 {
            let counter = Arc::new(AtomicUsize::new(0));
            let seen = counter.clone();
            listeners
                .register(move |cb: TransactionCallback| {
                    assert_eq!(cb.value, 500);
                    seen.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            counters.push(counter);
        }
        Harness {
            node: Arc::new(MockNode::new()),
            store: Arc::new(MemoryStore::new()),
            listeners,
            counters,
        }
    }

    fn recovery(h: &Harness) -> RecoveryLoop {
        RecoveryLoop::new(
            h.node.clone(),
            h.store.clone(),
            h.listeners.clone(),
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn test_success_settles_and_notifies_once() {
        let h = harness().await;
        let pending = record(1);
        h.store.put_pending(&pending).unwrap();
        h.node.set_receipt(pending.tx_id, Some(ReceiptStatus::Success));

        let first = check_pending(h.node.as_ref(), h.store.as_ref(), &h.listeners, pending.clone())
            .await;
        let second =
            check_pending(h.node.as_ref(), h.store.as_ref(), &h.listeners, pending).await;

        assert_eq!(first, CheckOutcome::Settled);
        assert_eq!(second, CheckOutcome::AlreadySettled);
        assert_eq!(h.notifications(), vec![1, 1]);
        assert!(h.store.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_or_unmined_records_stay() {
        let h = harness().await;
        let failed = record(1);
        let unmined = record(2);
        h.store.put_pending(&failed).unwrap();
        h.store.put_pending(&unmined).unwrap();
        h.node.set_receipt(failed.tx_id, Some(ReceiptStatus::Failed));

        let outcomes: Vec<CheckOutcome> = {
            let mut out = Vec::new();
            for handle in recovery(&h).run_cycle().await {
                out.push(handle.await.unwrap());
            }
            out
        };

        assert!(outcomes.contains(&CheckOutcome::StillFailed));
        assert!(outcomes.contains(&CheckOutcome::Unmined));
        assert_eq!(h.store.pending().unwrap().len(), 2);
        assert_eq!(h.notifications(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_spawned_loop_recovers_and_stops() {
        let h = harness().await;
        let pending = record(9);
        h.store.put_pending(&pending).unwrap();
        h.node.set_receipt(pending.tx_id, Some(ReceiptStatus::Failed));

        let handle = recovery(&h).spawn();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.store.pending().unwrap().len(), 1);

        h.node.set_receipt(pending.tx_id, Some(ReceiptStatus::Success));
        for _ in 0..100 {
            if h.notifications() == vec![1, 1] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // Later cycles find nothing left to settle
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(h.notifications(), vec![1, 1]);
        assert!(h.store.pending().unwrap().is_empty());
        handle.stop().await;
    }
}

//! Transaction listener registry
//!
//! Listeners are plain callbacks. Each delivery runs on its own blocking
//! task, gated by a semaphore so a burst of events cannot occupy an unbounded
//! number of blocking threads. Dispatch never waits for a permit.

use crate::core::TransactionCallback;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;

/// A transaction completion callback
pub type Listener = Arc<dyn Fn(TransactionCallback) + Send + Sync>;

/// Registered listeners plus the delivery bound
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Listener>>,
    permits: Arc<Semaphore>,
}

impl ListenerRegistry {
    /// Registry allowing at most `max_tasks` concurrent deliveries
    pub fn new(max_tasks: usize) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            permits: Arc::new(Semaphore::new(max_tasks.max(1))),
        }
    }

    pub async fn register<F>(&self, listener: F)
    where
        F: Fn(TransactionCallback) + Send + Sync + 'static,
    {
        self.listeners.write().await.push(Arc::new(listener));
    }

    pub async fn len(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Deliver `event` to every listener without waiting on delivery
    ///
    /// One dispatch task is spawned per listener in registration order. Each
    /// waits for a delivery permit and then runs its listener on a blocking
    /// task, so a slow listener delays only later deliveries, never the
    /// caller. The returned handles complete as each listener returns.
    pub async fn notify_all(&self, event: TransactionCallback) -> Vec<JoinHandle<()>> {
        let listeners: Vec<Listener> = self.listeners.read().await.clone();
        let txid = event.txid;

        let handles: Vec<JoinHandle<()>> = listeners
            .into_iter()
            .map(|listener| {
                let permits = self.permits.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    let permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            log::error!("Listener delivery stopped: {}", e);
                            return;
                        }
                    };
                    let delivery = tokio::task::spawn_blocking(move || {
                        listener(event);
                        drop(permit);
                    });
                    if let Err(e) = delivery.await {
                        log::error!("Transaction listener panicked: {}", e);
                    }
                })
            })
            .collect();

        log::debug!("Dispatched transaction {} to {} listeners", txid, handles.len());
        handles
    }
}

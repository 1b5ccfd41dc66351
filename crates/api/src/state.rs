//! Application state shared across handlers.

use jobq::{QueueCounts, QueueError, QueueName, QueueRuntime};
use lead_store::Store;
use std::collections::BTreeMap;
use std::sync::Arc;
use worker::AccountService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Lead store, pinged by the health checks
    pub store: Arc<dyn Store>,
    /// Queue runtime, for per-queue counts
    pub runtime: Arc<QueueRuntime>,
    /// Applies billing events
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, runtime: Arc<QueueRuntime>, accounts: Arc<AccountService>) -> Self {
        Self {
            store,
            runtime,
            accounts,
        }
    }

    /// Job counts for every queue, keyed by queue name.
    pub async fn queue_counts(&self) -> Result<BTreeMap<String, QueueCounts>, QueueError> {
        let mut counts = BTreeMap::new();
        for queue in QueueName::ALL {
            counts.insert(queue.to_string(), self.runtime.counts(queue).await?);
        }
        Ok(counts)
    }
}

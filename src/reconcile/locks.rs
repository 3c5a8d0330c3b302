//! Per-contract lock registry.
//!
//! Each contract id maps to a FIFO `tokio::sync::Mutex`, so reconciliations
//! of one contract run one at a time in arrival order while different
//! contracts proceed in parallel. The storage transaction still takes its
//! own write lock; this registry keeps waiters out of the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::error::{ReconcileError, Result};

/// Guard held for the whole unit of work on one contract.
pub type ContractGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default, Clone)]
pub struct ContractLocks {
    slots: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ContractLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `timeout` for exclusive access to `contract_id`.
    pub async fn acquire(&self, contract_id: Uuid, timeout: Duration) -> Result<ContractGuard> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // Slots referenced only by the map are idle.
            slots.retain(|id, slot| *id == contract_id || Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(contract_id).or_default())
        };

        tokio::time::timeout(timeout, slot.lock_owned())
            .await
            .map_err(|_| ReconcileError::LockContention {
                contract_id,
                waited: timeout,
            })
    }

    /// Number of contracts with a live slot.
    pub async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}

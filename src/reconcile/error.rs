//! Reconciliation error types.

use std::time::Duration;

use uuid::Uuid;

use crate::ledger::IntegrityError;
use crate::storage::StorageError;

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors surfaced by [`Reconciler`](super::Reconciler).
///
/// Whatever the variant, the contract, customer and mirror rows are left in
/// their last committed state.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Data integrity violation: {0}")]
    DataIntegrity(#[from] IntegrityError),

    #[error("Timed out after {waited:?} waiting for lock on contract {contract_id}")]
    LockContention { contract_id: Uuid, waited: Duration },

    #[error("Storage failure after {attempts} attempt(s): {source}")]
    Storage {
        attempts: usize,
        #[source]
        source: StorageError,
    },

    #[error("Contract not found: {0}")]
    ContractNotFound(Uuid),

    #[error("Reconciliation of contract {contract_id} aborted: {reason}")]
    Aborted { contract_id: Uuid, reason: String },
}

impl ReconcileError {
    /// Whether the caller may retry the same reconciliation later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::LockContention { .. } => true,
            ReconcileError::Storage { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

impl From<StorageError> for ReconcileError {
    fn from(source: StorageError) -> Self {
        ReconcileError::Storage {
            attempts: 1,
            source,
        }
    }
}

//! Data integrity violations raised by the pure ledger functions.

use uuid::Uuid;

/// Malformed or contradictory ledger data.
///
/// These are contract violations by whoever wrote the data. They are fatal
/// for the reconciliation that hits them and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("Duplicate payment sequence {sequence} in contract history")]
    DuplicateSequence { sequence: u32 },

    #[error("Payment sequence {sequence} is marked paid but has no recorded date")]
    PaidWithoutDate { sequence: u32 },

    #[error("Payment sequence {sequence} has a negative amount")]
    NegativeAmount { sequence: u32 },

    #[error("Payment amounts overflow at sequence {sequence}")]
    AmountOverflow { sequence: u32 },

    #[error("Bad-debt total overflows at contract {contract_id}")]
    DebtOverflow { contract_id: Uuid },

    #[error("Contract {contract_id} appears more than once in aggregation set")]
    DuplicateContract { contract_id: Uuid },

    #[error("Contract {contract_id} belongs to customer {actual}, not {expected}")]
    ForeignContract {
        contract_id: Uuid,
        expected: Uuid,
        actual: Uuid,
    },

    #[error("Contract {contract_id} references missing customer {customer_id}")]
    MissingCustomer { contract_id: Uuid, customer_id: Uuid },

    #[error("Failed to encode payment snapshot: {0}")]
    Snapshot(String),
}

/// Result type for the pure ledger functions.
pub type Result<T> = std::result::Result<T, IntegrityError>;

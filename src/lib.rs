//! Lendledger - contract ledger reconciliation
//!
//! Derives the debit status of installment and pawn contracts from their
//! payment schedules, keeps each customer's bad-debt aggregate and each
//! contract's cash mirror row in step, and commits all three atomically.

pub mod config;
pub mod ledger;
pub mod model;
pub mod reconcile;
pub mod storage;
pub mod utils;

pub use ledger::{BadDebtPolicy, IntegrityError};
pub use model::{Contract, Customer, DebitStatus, PaymentPeriod};
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
pub use storage::{LedgerStore, StorageError};

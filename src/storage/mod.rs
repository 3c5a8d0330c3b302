//! Storage gateway.
//!
//! [`LedgerStore`] is the backing store for contracts, payment periods,
//! customers and cash mirror rows. Reconciliation works through a
//! [`LedgerTransaction`] unit of work; everything else (opening contracts,
//! recording payments, reporting reads) goes through the store directly and
//! never touches the derived fields.
//!
//! Implementations:
//! - `SqliteLedgerStore`: SQLite via sqlx + sea-query
//! - `MemoryLedgerStore`: in-process store with fault injection for tests

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::config::{ReconciliationConfig, StorageConfig, StorageType};
use crate::ledger::{CashMirrorPayload, DebtSummary};
use crate::model::{
    CashMirrorRecord, Contract, Customer, DebitStatus, Money, PaymentPeriod, PaymentState,
};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryLedgerStore, WriteTarget};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedgerStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid value in column {column}: {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Storage busy: {0}")]
    Busy(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Transport or commit failures worth retrying with a fresh transaction.
    ///
    /// `Busy` is excluded: lock waits are already bounded by the backend and
    /// surface to the caller as contention.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            #[cfg(feature = "sqlite")]
            StorageError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        // SQLITE_BUSY and its extended codes share the low byte 5.
        let busy = e
            .as_database_error()
            .and_then(|db| db.code())
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| code & 0xff == 5);
        if busy {
            return StorageError::Busy(e.to_string());
        }
        StorageError::Database(e)
    }
}

/// Payment recorded against one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub paid_amount: Money,
    pub paid_date: Option<NaiveDate>,
    pub state: PaymentState,
}

impl PaymentUpdate {
    /// Full settlement of `period` on `date`.
    pub fn settle(period: &PaymentPeriod, date: NaiveDate) -> Self {
        Self {
            paid_amount: period.expected_total(),
            paid_date: Some(date),
            state: PaymentState::Paid,
        }
    }

    /// Partial payment that leaves the period open.
    pub fn partial(amount: Money, date: NaiveDate) -> Self {
        Self {
            paid_amount: amount,
            paid_date: Some(date),
            state: PaymentState::Unpaid,
        }
    }

    /// Reverse a recorded payment.
    pub fn reversal() -> Self {
        Self {
            paid_amount: 0,
            paid_date: None,
            state: PaymentState::Unpaid,
        }
    }
}

/// Interface for ledger persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start a reconciliation unit of work holding write intent.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;

    /// Insert a customer with zeroed debt figures.
    async fn create_customer(&self, customer: &Customer) -> Result<()>;

    /// Insert a contract and its full schedule.
    ///
    /// The stored status is always `Current` and `settled_date` empty until
    /// the first reconciliation.
    async fn open_contract(&self, contract: &Contract) -> Result<()>;

    /// Insert the receipt cash entry created at disbursement.
    ///
    /// Status and snapshot start empty and are filled by reconciliation.
    async fn attach_cash_mirror(&self, record: &CashMirrorRecord) -> Result<()>;

    /// Record a payment against a live period.
    async fn record_payment(
        &self,
        contract_id: Uuid,
        sequence: u32,
        update: &PaymentUpdate,
    ) -> Result<()>;

    /// Append periods after an extension or top-up.
    async fn append_periods(&self, contract_id: Uuid, periods: &[PaymentPeriod]) -> Result<()>;

    /// Soft-delete a period; the row is kept for audit.
    async fn soft_delete_period(&self, contract_id: Uuid, sequence: u32) -> Result<()>;

    /// Contract with its live periods in sequence order.
    async fn contract(&self, id: Uuid) -> Result<Option<Contract>>;

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>>;

    async fn cash_mirror_for(&self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>>;

    /// All contract ids, both product lines.
    async fn contract_ids(&self) -> Result<Vec<Uuid>>;
}

/// Atomic unit of work used by reconciliation.
///
/// Nothing written through a transaction is visible to other readers until
/// [`commit`](LedgerTransaction::commit). Dropping a transaction without
/// committing discards its writes.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Load a contract and its live periods under write intent.
    async fn lock_contract(&mut self, id: Uuid) -> Result<Option<Contract>>;

    async fn load_customer(&mut self, id: Uuid) -> Result<Option<Customer>>;

    /// Every contract of the customer with live periods, both product lines.
    async fn load_customer_contracts(&mut self, customer_id: Uuid) -> Result<Vec<Contract>>;

    async fn load_cash_mirror(&mut self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>>;

    async fn update_contract_status(
        &mut self,
        id: Uuid,
        status: DebitStatus,
        settled_date: Option<NaiveDate>,
    ) -> Result<()>;

    async fn update_customer_debt(&mut self, id: Uuid, summary: &DebtSummary) -> Result<()>;

    async fn update_cash_mirror(&mut self, id: Uuid, payload: &CashMirrorPayload) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Initialize storage based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
    reconciliation: &ReconciliationConfig,
) -> Result<Arc<dyn LedgerStore>> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory");
            Ok(Arc::new(
                MemoryLedgerStore::new().with_busy_timeout(reconciliation.lock_timeout()),
            ))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(path = %config.sqlite.path, "Storage: sqlite");
            let store = SqliteLedgerStore::connect(&config.sqlite, reconciliation.lock_timeout())
                .await?;
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::Unavailable(
                "sqlite feature not enabled".to_string(),
            ))
        }
    }
}

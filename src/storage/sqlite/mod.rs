//! SQLite implementation of the storage gateway.

mod queries;
mod transaction;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::SqliteConfig;
use crate::model::{CashMirrorRecord, Contract, Customer, DebitStatus, PaymentPeriod};
use crate::storage::schema::{
    CashMirrors, Contracts, Customers, PaymentPeriods, CREATE_CASH_MIRRORS_TABLE,
    CREATE_CONTRACTS_TABLE, CREATE_CUSTOMERS_TABLE, CREATE_PAYMENT_PERIODS_TABLE,
};
use crate::storage::{
    LedgerStore, LedgerTransaction, PaymentUpdate, Result, StorageError,
};

pub use transaction::SqliteLedgerTransaction;

/// SQLite implementation of LedgerStore.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Create a new SQLite ledger store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database file named in `config`.
    ///
    /// `busy_timeout` bounds how long a connection waits for the write lock
    /// held by another transaction.
    pub async fn connect(config: &SqliteConfig, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for ddl in [
            CREATE_CUSTOMERS_TABLE,
            CREATE_CONTRACTS_TABLE,
            CREATE_PAYMENT_PERIODS_TABLE,
            CREATE_CASH_MIRRORS_TABLE,
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let tx = SqliteLedgerTransaction::begin(&self.pool).await?;
        Ok(Box::new(tx))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<()> {
        let query = Query::insert()
            .into_table(Customers::Table)
            .columns([
                Customers::Id,
                Customers::Name,
                Customers::IsDebt,
                Customers::DebtMoney,
            ])
            .values_panic([
                customer.id.to_string().into(),
                customer.name.clone().into(),
                0i32.into(),
                0i64.into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn open_contract(&self, contract: &Contract) -> Result<()> {
        let query = Query::insert()
            .into_table(Contracts::Table)
            .columns([
                Contracts::Id,
                Contracts::CustomerId,
                Contracts::StaffId,
                Contracts::Product,
                Contracts::Principal,
                Contracts::LoanDate,
                Contracts::SettledDate,
                Contracts::DebitStatus,
            ])
            .values_panic([
                contract.id.to_string().into(),
                contract.customer_id.to_string().into(),
                contract.staff_id.to_string().into(),
                contract.product.as_str().into(),
                contract.principal.into(),
                contract.loan_date.to_string().into(),
                Option::<String>::None.into(),
                DebitStatus::Current.as_str().into(),
            ])
            .to_string(SqliteQueryBuilder);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&query).execute(&mut *tx).await?;
        queries::insert_periods(&mut tx, contract.id, &contract.periods).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn attach_cash_mirror(&self, record: &CashMirrorRecord) -> Result<()> {
        let query = Query::insert()
            .into_table(CashMirrors::Table)
            .columns([
                CashMirrors::Id,
                CashMirrors::ContractId,
                CashMirrors::Amount,
                CashMirrors::Status,
                CashMirrors::PaymentSnapshot,
            ])
            .values_panic([
                record.id.to_string().into(),
                record.contract_id.map(|c| c.to_string()).into(),
                record.amount.into(),
                "".into(),
                "".into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn record_payment(
        &self,
        contract_id: Uuid,
        sequence: u32,
        update: &PaymentUpdate,
    ) -> Result<()> {
        let query = Query::update()
            .table(PaymentPeriods::Table)
            .values([
                (PaymentPeriods::PaidAmount, update.paid_amount.into()),
                (
                    PaymentPeriods::PaidDate,
                    update.paid_date.map(|d| d.to_string()).into(),
                ),
                (PaymentPeriods::State, update.state.as_str().into()),
            ])
            .and_where(Expr::col(PaymentPeriods::ContractId).eq(contract_id.to_string()))
            .and_where(Expr::col(PaymentPeriods::Sequence).eq(i64::from(sequence)))
            .and_where(Expr::col(PaymentPeriods::Deleted).eq(0))
            .to_string(SqliteQueryBuilder);

        let mut conn = self.pool.acquire().await?;
        queries::execute_update(
            &mut conn,
            &query,
            "payment period",
            format!("{contract_id}#{sequence}"),
        )
        .await
    }

    async fn append_periods(&self, contract_id: Uuid, periods: &[PaymentPeriod]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if queries::fetch_contract(&mut tx, contract_id).await?.is_none() {
            return Err(StorageError::not_found("contract", contract_id));
        }
        queries::insert_periods(&mut tx, contract_id, periods).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn soft_delete_period(&self, contract_id: Uuid, sequence: u32) -> Result<()> {
        let query = Query::update()
            .table(PaymentPeriods::Table)
            .values([(PaymentPeriods::Deleted, 1i32.into())])
            .and_where(Expr::col(PaymentPeriods::ContractId).eq(contract_id.to_string()))
            .and_where(Expr::col(PaymentPeriods::Sequence).eq(i64::from(sequence)))
            .and_where(Expr::col(PaymentPeriods::Deleted).eq(0))
            .to_string(SqliteQueryBuilder);

        let mut conn = self.pool.acquire().await?;
        queries::execute_update(
            &mut conn,
            &query,
            "payment period",
            format!("{contract_id}#{sequence}"),
        )
        .await
    }

    async fn contract(&self, id: Uuid) -> Result<Option<Contract>> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_contract(&mut conn, id).await
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_customer(&mut conn, id).await
    }

    async fn cash_mirror_for(&self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_cash_mirror(&mut conn, contract_id).await
    }

    async fn contract_ids(&self) -> Result<Vec<Uuid>> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_contract_ids(&mut conn).await
    }
}

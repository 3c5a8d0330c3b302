//! SQLite reconciliation unit of work.

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

use super::queries;
use crate::ledger::{CashMirrorPayload, DebtSummary};
use crate::model::{CashMirrorRecord, Contract, Customer, DebitStatus};
use crate::storage::schema::{CashMirrors, Contracts, Customers};
use crate::storage::{LedgerTransaction, Result};

/// Transaction opened with `BEGIN IMMEDIATE`.
///
/// SQLite has no row locks; taking the database write lock at BEGIN is the
/// write intent. Concurrent reconciliations queue on it for at most the
/// connection's busy timeout.
pub struct SqliteLedgerTransaction {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl SqliteLedgerTransaction {
    pub(super) async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn, open: true })
    }
}

impl Drop for SqliteLedgerTransaction {
    fn drop(&mut self) {
        // Never hand a connection with an open transaction back to the pool;
        // closing it makes SQLite roll back.
        if self.open {
            self.conn.close_on_drop();
        }
    }
}

#[async_trait]
impl LedgerTransaction for SqliteLedgerTransaction {
    async fn lock_contract(&mut self, id: Uuid) -> Result<Option<Contract>> {
        queries::fetch_contract(&mut self.conn, id).await
    }

    async fn load_customer(&mut self, id: Uuid) -> Result<Option<Customer>> {
        queries::fetch_customer(&mut self.conn, id).await
    }

    async fn load_customer_contracts(&mut self, customer_id: Uuid) -> Result<Vec<Contract>> {
        queries::fetch_customer_contracts(&mut self.conn, customer_id).await
    }

    async fn load_cash_mirror(&mut self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>> {
        queries::fetch_cash_mirror(&mut self.conn, contract_id).await
    }

    async fn update_contract_status(
        &mut self,
        id: Uuid,
        status: DebitStatus,
        settled_date: Option<NaiveDate>,
    ) -> Result<()> {
        let query = Query::update()
            .table(Contracts::Table)
            .values([
                (Contracts::DebitStatus, status.as_str().into()),
                (
                    Contracts::SettledDate,
                    settled_date.map(|d| d.to_string()).into(),
                ),
            ])
            .and_where(Expr::col(Contracts::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        queries::execute_update(&mut self.conn, &query, "contract", id).await
    }

    async fn update_customer_debt(&mut self, id: Uuid, summary: &DebtSummary) -> Result<()> {
        let query = Query::update()
            .table(Customers::Table)
            .values([
                (Customers::IsDebt, i32::from(summary.is_debt).into()),
                (Customers::DebtMoney, summary.total_bad_debt.into()),
            ])
            .and_where(Expr::col(Customers::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        queries::execute_update(&mut self.conn, &query, "customer", id).await
    }

    async fn update_cash_mirror(&mut self, id: Uuid, payload: &CashMirrorPayload) -> Result<()> {
        let query = Query::update()
            .table(CashMirrors::Table)
            .values([
                (CashMirrors::Status, payload.status.clone().into()),
                (CashMirrors::PaymentSnapshot, payload.snapshot.clone().into()),
            ])
            .and_where(Expr::col(CashMirrors::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        queries::execute_update(&mut self.conn, &query, "cash mirror", id).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        sqlx::query("COMMIT").execute(&mut *this.conn).await?;
        this.open = false;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut this = self;
        sqlx::query("ROLLBACK").execute(&mut *this.conn).await?;
        this.open = false;
        Ok(())
    }
}

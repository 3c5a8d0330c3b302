//! Row mapping and queries shared by the store and its transactions.

use chrono::NaiveDate;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::model::{
    CashMirrorRecord, Contract, Customer, DebitStatus, PaymentPeriod, PaymentState, ProductType,
};
use crate::storage::schema::{CashMirrors, Contracts, Customers, PaymentPeriods};
use crate::storage::{Result, StorageError};

fn invalid(column: &'static str, value: impl ToString) -> StorageError {
    StorageError::InvalidColumn {
        column,
        value: value.to_string(),
    }
}

fn parse_date(column: &'static str, value: &str) -> Result<NaiveDate> {
    value.parse().map_err(|_| invalid(column, value))
}

fn parse_optional_date(column: &'static str, value: Option<String>) -> Result<Option<NaiveDate>> {
    value.map(|v| parse_date(column, &v)).transpose()
}

fn flag(row: &SqliteRow, column: &'static str) -> Result<bool> {
    let value: i64 = row.try_get(column)?;
    Ok(value != 0)
}

fn contract_from_row(row: &SqliteRow, periods: Vec<PaymentPeriod>) -> Result<Contract> {
    let id: String = row.try_get("id")?;
    let customer_id: String = row.try_get("customer_id")?;
    let staff_id: String = row.try_get("staff_id")?;
    let product: String = row.try_get("product")?;
    let loan_date: String = row.try_get("loan_date")?;
    let settled_date: Option<String> = row.try_get("settled_date")?;
    let debit_status: String = row.try_get("debit_status")?;

    Ok(Contract {
        id: Uuid::parse_str(&id)?,
        customer_id: Uuid::parse_str(&customer_id)?,
        staff_id: Uuid::parse_str(&staff_id)?,
        product: ProductType::parse(&product).ok_or_else(|| invalid("product", &product))?,
        principal: row.try_get("principal")?,
        loan_date: parse_date("loan_date", &loan_date)?,
        settled_date: parse_optional_date("settled_date", settled_date)?,
        debit_status: DebitStatus::parse(&debit_status)
            .ok_or_else(|| invalid("debit_status", &debit_status))?,
        periods,
    })
}

fn period_from_row(row: &SqliteRow) -> Result<PaymentPeriod> {
    let sequence: i64 = row.try_get("sequence")?;
    let due_date: String = row.try_get("due_date")?;
    let paid_date: Option<String> = row.try_get("paid_date")?;
    let state: String = row.try_get("state")?;

    Ok(PaymentPeriod {
        sequence: u32::try_from(sequence).map_err(|_| invalid("sequence", sequence))?,
        due_date: parse_date("due_date", &due_date)?,
        interest_due: row.try_get("interest_due")?,
        principal_due: row.try_get("principal_due")?,
        paid_amount: row.try_get("paid_amount")?,
        paid_date: parse_optional_date("paid_date", paid_date)?,
        is_maturity: flag(row, "is_maturity")?,
        is_deduction: flag(row, "is_deduction")?,
        is_root_money: flag(row, "is_root_money")?,
        state: PaymentState::parse(&state).ok_or_else(|| invalid("state", &state))?,
    })
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer> {
    let id: String = row.try_get("id")?;
    Ok(Customer {
        id: Uuid::parse_str(&id)?,
        name: row.try_get("name")?,
        is_debt: flag(row, "is_debt")?,
        debt_money: row.try_get("debt_money")?,
    })
}

fn cash_mirror_from_row(row: &SqliteRow) -> Result<CashMirrorRecord> {
    let id: String = row.try_get("id")?;
    let contract_id: Option<String> = row.try_get("contract_id")?;
    Ok(CashMirrorRecord {
        id: Uuid::parse_str(&id)?,
        contract_id: contract_id.map(|c| Uuid::parse_str(&c)).transpose()?,
        amount: row.try_get("amount")?,
        status: row.try_get("status")?,
        payment_snapshot: row.try_get("payment_snapshot")?,
    })
}

const CONTRACT_COLUMNS: [Contracts; 8] = [
    Contracts::Id,
    Contracts::CustomerId,
    Contracts::StaffId,
    Contracts::Product,
    Contracts::Principal,
    Contracts::LoanDate,
    Contracts::SettledDate,
    Contracts::DebitStatus,
];

const PERIOD_COLUMNS: [PaymentPeriods; 10] = [
    PaymentPeriods::Sequence,
    PaymentPeriods::DueDate,
    PaymentPeriods::InterestDue,
    PaymentPeriods::PrincipalDue,
    PaymentPeriods::PaidAmount,
    PaymentPeriods::PaidDate,
    PaymentPeriods::IsMaturity,
    PaymentPeriods::IsDeduction,
    PaymentPeriods::IsRootMoney,
    PaymentPeriods::State,
];

/// Live periods of a contract in sequence order.
async fn fetch_periods(conn: &mut SqliteConnection, contract_id: &str) -> Result<Vec<PaymentPeriod>> {
    let query = Query::select()
        .columns(PERIOD_COLUMNS)
        .from(PaymentPeriods::Table)
        .and_where(Expr::col(PaymentPeriods::ContractId).eq(contract_id))
        .and_where(Expr::col(PaymentPeriods::Deleted).eq(0))
        .order_by(PaymentPeriods::Sequence, Order::Asc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
    rows.iter().map(period_from_row).collect()
}

pub(super) async fn fetch_contract(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Contract>> {
    let id_str = id.to_string();
    let query = Query::select()
        .columns(CONTRACT_COLUMNS)
        .from(Contracts::Table)
        .and_where(Expr::col(Contracts::Id).eq(&id_str))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => {
            let periods = fetch_periods(conn, &id_str).await?;
            Ok(Some(contract_from_row(&row, periods)?))
        }
        None => Ok(None),
    }
}

pub(super) async fn fetch_customer_contracts(
    conn: &mut SqliteConnection,
    customer_id: Uuid,
) -> Result<Vec<Contract>> {
    let query = Query::select()
        .columns(CONTRACT_COLUMNS)
        .from(Contracts::Table)
        .and_where(Expr::col(Contracts::CustomerId).eq(customer_id.to_string()))
        .order_by(Contracts::Id, Order::Asc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;

    let mut contracts = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.try_get("id")?;
        let periods = fetch_periods(conn, &id).await?;
        contracts.push(contract_from_row(&row, periods)?);
    }
    Ok(contracts)
}

pub(super) async fn fetch_contract_ids(conn: &mut SqliteConnection) -> Result<Vec<Uuid>> {
    let query = Query::select()
        .column(Contracts::Id)
        .from(Contracts::Table)
        .order_by(Contracts::Id, Order::Asc)
        .to_string(SqliteQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;

    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.try_get("id")?;
        ids.push(Uuid::parse_str(&id)?);
    }
    Ok(ids)
}

pub(super) async fn fetch_customer(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Customer>> {
    let query = Query::select()
        .columns([
            Customers::Id,
            Customers::Name,
            Customers::IsDebt,
            Customers::DebtMoney,
        ])
        .from(Customers::Table)
        .and_where(Expr::col(Customers::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(customer_from_row).transpose()
}

pub(super) async fn fetch_cash_mirror(
    conn: &mut SqliteConnection,
    contract_id: Uuid,
) -> Result<Option<CashMirrorRecord>> {
    let query = Query::select()
        .columns([
            CashMirrors::Id,
            CashMirrors::ContractId,
            CashMirrors::Amount,
            CashMirrors::Status,
            CashMirrors::PaymentSnapshot,
        ])
        .from(CashMirrors::Table)
        .and_where(Expr::col(CashMirrors::ContractId).eq(contract_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(cash_mirror_from_row).transpose()
}

pub(super) async fn insert_periods(
    conn: &mut SqliteConnection,
    contract_id: Uuid,
    periods: &[PaymentPeriod],
) -> Result<()> {
    let contract_id = contract_id.to_string();

    for period in periods {
        let query = Query::insert()
            .into_table(PaymentPeriods::Table)
            .columns([
                PaymentPeriods::ContractId,
                PaymentPeriods::Sequence,
                PaymentPeriods::DueDate,
                PaymentPeriods::InterestDue,
                PaymentPeriods::PrincipalDue,
                PaymentPeriods::PaidAmount,
                PaymentPeriods::PaidDate,
                PaymentPeriods::IsMaturity,
                PaymentPeriods::IsDeduction,
                PaymentPeriods::IsRootMoney,
                PaymentPeriods::State,
            ])
            .values_panic([
                contract_id.clone().into(),
                i64::from(period.sequence).into(),
                period.due_date.to_string().into(),
                period.interest_due.into(),
                period.principal_due.into(),
                period.paid_amount.into(),
                period.paid_date.map(|d| d.to_string()).into(),
                i32::from(period.is_maturity).into(),
                i32::from(period.is_deduction).into(),
                i32::from(period.is_root_money).into(),
                period.state.as_str().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
    }

    Ok(())
}

/// Run an UPDATE and fail with `NotFound` when it matched no row.
pub(super) async fn execute_update(
    conn: &mut SqliteConnection,
    query: &str,
    entity: &'static str,
    id: impl ToString,
) -> Result<()> {
    let result = sqlx::query(query).execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(entity, id));
    }
    Ok(())
}

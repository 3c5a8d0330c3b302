//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Customers table schema.
#[derive(Iden)]
pub enum Customers {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "name"]
    Name,
    #[iden = "is_debt"]
    IsDebt,
    #[iden = "debt_money"]
    DebtMoney,
}

/// Contracts table schema. One table for both product lines.
#[derive(Iden)]
pub enum Contracts {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "customer_id"]
    CustomerId,
    #[iden = "staff_id"]
    StaffId,
    #[iden = "product"]
    Product,
    #[iden = "principal"]
    Principal,
    #[iden = "loan_date"]
    LoanDate,
    #[iden = "settled_date"]
    SettledDate,
    #[iden = "debit_status"]
    DebitStatus,
}

/// Payment periods table schema.
#[derive(Iden)]
pub enum PaymentPeriods {
    Table,
    #[iden = "contract_id"]
    ContractId,
    #[iden = "sequence"]
    Sequence,
    #[iden = "due_date"]
    DueDate,
    #[iden = "interest_due"]
    InterestDue,
    #[iden = "principal_due"]
    PrincipalDue,
    #[iden = "paid_amount"]
    PaidAmount,
    #[iden = "paid_date"]
    PaidDate,
    #[iden = "is_maturity"]
    IsMaturity,
    #[iden = "is_deduction"]
    IsDeduction,
    #[iden = "is_root_money"]
    IsRootMoney,
    #[iden = "state"]
    State,
    #[iden = "deleted"]
    Deleted,
}

/// Cash mirror table schema.
#[derive(Iden)]
pub enum CashMirrors {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "contract_id"]
    ContractId,
    #[iden = "amount"]
    Amount,
    #[iden = "status"]
    Status,
    #[iden = "payment_snapshot"]
    PaymentSnapshot,
}

/// SQL for creating the customers table.
pub const CREATE_CUSTOMERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    is_debt INTEGER NOT NULL DEFAULT 0,
    debt_money INTEGER NOT NULL DEFAULT 0
);
"#;

/// SQL for creating the contracts table.
pub const CREATE_CONTRACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS contracts (
    id TEXT PRIMARY KEY NOT NULL,
    customer_id TEXT NOT NULL REFERENCES customers(id),
    staff_id TEXT NOT NULL,
    product TEXT NOT NULL,
    principal INTEGER NOT NULL,
    loan_date TEXT NOT NULL,
    settled_date TEXT,
    debit_status TEXT NOT NULL DEFAULT 'CURRENT'
);

CREATE INDEX IF NOT EXISTS idx_contracts_customer ON contracts(customer_id);
"#;

/// SQL for creating the payment periods table.
///
/// Sequence numbers are unique among live rows only; soft-deleted rows stay
/// for audit.
pub const CREATE_PAYMENT_PERIODS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS payment_periods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contract_id TEXT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    due_date TEXT NOT NULL,
    interest_due INTEGER NOT NULL,
    principal_due INTEGER NOT NULL,
    paid_amount INTEGER NOT NULL DEFAULT 0,
    paid_date TEXT,
    is_maturity INTEGER NOT NULL DEFAULT 0,
    is_deduction INTEGER NOT NULL DEFAULT 0,
    is_root_money INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'unpaid',
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_payment_periods_live
    ON payment_periods(contract_id, sequence) WHERE deleted = 0;
"#;

/// SQL for creating the cash mirrors table.
pub const CREATE_CASH_MIRRORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cash_mirrors (
    id TEXT PRIMARY KEY NOT NULL,
    contract_id TEXT UNIQUE REFERENCES contracts(id) ON DELETE SET NULL,
    amount INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT '',
    payment_snapshot TEXT NOT NULL DEFAULT ''
);
"#;

//! Contracts, customers and cash mirror rows.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Money, PaymentPeriod};

/// Lending product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Installment,
    Pawn,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Installment => "installment",
            ProductType::Pawn => "pawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "installment" => Some(ProductType::Installment),
            "pawn" => Some(ProductType::Pawn),
            _ => None,
        }
    }
}

/// Derived lifecycle state of a contract.
///
/// Ordered by severity for the open states: `Current < Late < BadDebt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebitStatus {
    #[default]
    Current,
    Late,
    BadDebt,
    Completed,
}

impl DebitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebitStatus::Current => "CURRENT",
            DebitStatus::Late => "LATE",
            DebitStatus::BadDebt => "BAD_DEBT",
            DebitStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CURRENT" => Some(DebitStatus::Current),
            "LATE" => Some(DebitStatus::Late),
            "BAD_DEBT" => Some(DebitStatus::BadDebt),
            "COMPLETED" => Some(DebitStatus::Completed),
            _ => None,
        }
    }

    pub(crate) fn severity(&self) -> u8 {
        match self {
            DebitStatus::Current | DebitStatus::Completed => 0,
            DebitStatus::Late => 1,
            DebitStatus::BadDebt => 2,
        }
    }
}

impl fmt::Display for DebitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lending contract of either product line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub staff_id: Uuid,
    pub product: ProductType,
    pub principal: Money,
    pub loan_date: NaiveDate,
    /// Set by reconciliation when the contract completes.
    pub settled_date: Option<NaiveDate>,
    /// Set by reconciliation only.
    pub debit_status: DebitStatus,
    /// Live (not soft-deleted) periods.
    pub periods: Vec<PaymentPeriod>,
}

impl Contract {
    /// New open contract with an empty schedule.
    pub fn open(
        product: ProductType,
        customer_id: Uuid,
        staff_id: Uuid,
        principal: Money,
        loan_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            staff_id,
            product,
            principal,
            loan_date,
            settled_date: None,
            debit_status: DebitStatus::Current,
            periods: Vec::new(),
        }
    }

    pub fn with_periods(mut self, periods: Vec<PaymentPeriod>) -> Self {
        self.periods = periods;
        self
    }

    /// Sum of the outstanding balance of every live period.
    pub fn outstanding(&self) -> Money {
        self.periods.iter().map(PaymentPeriod::outstanding).sum()
    }
}

/// Aggregation root for bad-debt totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    /// Materialized: `debt_money != 0`.
    pub is_debt: bool,
    /// Materialized: outstanding balance of all bad-debt contracts.
    pub debt_money: Money,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_debt: false,
            debt_money: 0,
        }
    }
}

/// Receipt cash-flow row mirroring a contract for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashMirrorRecord {
    pub id: Uuid,
    /// Lookup reference; `None` once the contract row is gone.
    pub contract_id: Option<Uuid>,
    /// Amount disbursed when the cash entry was created.
    pub amount: Money,
    pub status: String,
    /// JSON snapshot of the payment history.
    pub payment_snapshot: String,
}

impl CashMirrorRecord {
    pub fn for_contract(contract: &Contract) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id: Some(contract.id),
            amount: contract.principal,
            status: String::new(),
            payment_snapshot: String::new(),
        }
    }
}

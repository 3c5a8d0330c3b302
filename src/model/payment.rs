//! Payment period obligations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Money;

/// Whether a period has been marked as settled.
///
/// "Not yet due" is not a stored state; it falls out of comparing the due
/// date with the evaluation date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    Unpaid,
    Paid,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Unpaid => "unpaid",
            PaymentState::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unpaid" => Some(PaymentState::Unpaid),
            "paid" => Some(PaymentState::Paid),
            _ => None,
        }
    }
}

/// One periodic payment obligation of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPeriod {
    /// Period index, unique among the live periods of a contract.
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub interest_due: Money,
    /// Principal or other non-interest amount due this period.
    pub principal_due: Money,
    pub paid_amount: Money,
    /// Date the payment was recorded. Required once `state` is `Paid`.
    pub paid_date: Option<NaiveDate>,
    /// Final period of the contract.
    pub is_maturity: bool,
    /// Amount withheld at disbursement instead of collected later.
    pub is_deduction: bool,
    /// Principal-only period.
    pub is_root_money: bool,
    pub state: PaymentState,
}

impl PaymentPeriod {
    /// New unpaid period with no flags set.
    pub fn new(sequence: u32, due_date: NaiveDate, interest_due: Money, principal_due: Money) -> Self {
        Self {
            sequence,
            due_date,
            interest_due,
            principal_due,
            paid_amount: 0,
            paid_date: None,
            is_maturity: false,
            is_deduction: false,
            is_root_money: false,
            state: PaymentState::Unpaid,
        }
    }

    pub fn maturity(mut self) -> Self {
        self.is_maturity = true;
        self
    }

    pub fn deduction(mut self) -> Self {
        self.is_deduction = true;
        self
    }

    pub fn root_money(mut self) -> Self {
        self.is_root_money = true;
        self
    }

    /// Record a full payment on `date` and mark the period paid.
    pub fn paid_on(mut self, date: NaiveDate) -> Self {
        self.paid_amount = self.expected_total();
        self.paid_date = Some(date);
        self.state = PaymentState::Paid;
        self
    }

    pub fn expected_total(&self) -> Money {
        self.interest_due + self.principal_due
    }

    /// Amount still owed on this period.
    ///
    /// Deduction periods were withheld at disbursement and never carry an
    /// outstanding balance.
    pub fn outstanding(&self) -> Money {
        if self.is_deduction {
            return 0;
        }
        (self.expected_total() - self.paid_amount).max(0)
    }

    pub fn is_settled(&self) -> bool {
        self.outstanding() == 0
    }

    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.due_date < as_of && !self.is_settled()
    }

    /// Whole days past due at `as_of`, zero when not yet due.
    pub fn overdue_days(&self, as_of: NaiveDate) -> i64 {
        (as_of - self.due_date).num_days().max(0)
    }
}

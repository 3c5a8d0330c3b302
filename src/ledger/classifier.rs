//! Debit status classification.
//!
//! The classifier is a pure function of the payment history, the contract
//! principal and an explicit evaluation date. It never reads the clock, so a
//! classification can be reproduced for any historical instant.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;

use super::error::{IntegrityError, Result};
use crate::model::{Contract, DebitStatus, Money, PaymentPeriod, PaymentState};

/// Boundary beyond which an overdue contract counts as bad debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BadDebtPolicy {
    /// A period overdue for strictly more than this many days is bad debt.
    pub overdue_days: u32,
    /// Overdue unpaid amount above this fraction of principal (basis points)
    /// is bad debt regardless of age.
    #[serde(default)]
    pub principal_ratio_bps: Option<u32>,
}

impl BadDebtPolicy {
    pub fn new(overdue_days: u32) -> Self {
        Self {
            overdue_days,
            principal_ratio_bps: None,
        }
    }

    pub fn with_principal_ratio_bps(mut self, bps: u32) -> Self {
        self.principal_ratio_bps = Some(bps);
        self
    }

    fn exceeds_ratio(&self, overdue_unpaid: Money, principal: Money) -> bool {
        match self.principal_ratio_bps {
            Some(bps) if overdue_unpaid > 0 => {
                i128::from(overdue_unpaid) * 10_000 > i128::from(principal) * i128::from(bps)
            }
            _ => false,
        }
    }
}

/// Maps payment histories to debit statuses under one policy.
#[derive(Debug, Clone, Copy)]
pub struct StatusClassifier {
    policy: BadDebtPolicy,
}

impl StatusClassifier {
    pub fn new(policy: BadDebtPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BadDebtPolicy {
        &self.policy
    }

    /// Classify a contract from its live payment history.
    pub fn classify_contract(&self, contract: &Contract, as_of: NaiveDate) -> Result<DebitStatus> {
        self.classify(&contract.periods, contract.principal, as_of)
    }

    /// Classify a payment history as of `as_of`.
    ///
    /// Periods are scanned in due-date order with the sequence number as
    /// tie-break. The result is the most severe state met during the scan;
    /// `Completed` requires no unpaid period and a maturity period marked paid.
    pub fn classify(
        &self,
        history: &[PaymentPeriod],
        principal: Money,
        as_of: NaiveDate,
    ) -> Result<DebitStatus> {
        let ordered = ordered_history(history)?;

        let mut worst = DebitStatus::Current;
        let mut unpaid = 0usize;
        let mut overdue_unpaid: Money = 0;
        let mut maturity_settled = false;

        for period in ordered {
            if period.is_settled() {
                if period.is_maturity && period.state == PaymentState::Paid {
                    maturity_settled = true;
                }
                continue;
            }

            unpaid += 1;
            if !period.is_overdue(as_of) {
                continue;
            }

            overdue_unpaid += period.outstanding();
            let state = if period.overdue_days(as_of) > i64::from(self.policy.overdue_days) {
                DebitStatus::BadDebt
            } else {
                DebitStatus::Late
            };
            if state.severity() > worst.severity() {
                worst = state;
            }
        }

        if self.policy.exceeds_ratio(overdue_unpaid, principal) {
            worst = DebitStatus::BadDebt;
        }

        if unpaid == 0 && maturity_settled {
            return Ok(DebitStatus::Completed);
        }
        Ok(worst)
    }
}

/// Validate a history and return it in due-date order.
///
/// Amounts due and paid must each sum without overflow across the whole
/// history, so every total derived from an accepted history fits in `Money`.
pub(crate) fn ordered_history(history: &[PaymentPeriod]) -> Result<Vec<&PaymentPeriod>> {
    let mut seen = HashSet::with_capacity(history.len());
    let mut total_due: Money = 0;
    let mut total_paid: Money = 0;
    for period in history {
        if !seen.insert(period.sequence) {
            return Err(IntegrityError::DuplicateSequence {
                sequence: period.sequence,
            });
        }
        if period.interest_due < 0 || period.principal_due < 0 || period.paid_amount < 0 {
            return Err(IntegrityError::NegativeAmount {
                sequence: period.sequence,
            });
        }
        if period.state == PaymentState::Paid && period.paid_date.is_none() {
            return Err(IntegrityError::PaidWithoutDate {
                sequence: period.sequence,
            });
        }

        let due = period.interest_due.checked_add(period.principal_due);
        match (
            due.and_then(|due| total_due.checked_add(due)),
            total_paid.checked_add(period.paid_amount),
        ) {
            (Some(due), Some(paid)) => {
                total_due = due;
                total_paid = paid;
            }
            _ => {
                return Err(IntegrityError::AmountOverflow {
                    sequence: period.sequence,
                })
            }
        }
    }

    let mut ordered: Vec<&PaymentPeriod> = history.iter().collect();
    ordered.sort_by_key(|p| (p.due_date, p.sequence));
    Ok(ordered)
}

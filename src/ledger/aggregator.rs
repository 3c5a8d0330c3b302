//! Customer-level bad-debt aggregation.

use std::collections::HashSet;

use chrono::NaiveDate;
use uuid::Uuid;

use super::classifier::StatusClassifier;
use super::error::{IntegrityError, Result};
use crate::model::{Contract, Customer, DebitStatus, Money};

/// Materialized debt figures of one customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebtSummary {
    pub total_bad_debt: Money,
    pub is_debt: bool,
}

impl DebtSummary {
    pub fn from_total(total_bad_debt: Money) -> Self {
        Self {
            total_bad_debt,
            is_debt: total_bad_debt != 0,
        }
    }

    /// Figures currently stored on the customer row.
    pub fn stored(customer: &Customer) -> Self {
        Self {
            total_bad_debt: customer.debt_money,
            is_debt: customer.is_debt,
        }
    }
}

/// Recomputes a customer's bad-debt totals from scratch.
#[derive(Debug, Clone, Copy)]
pub struct DebtAggregator {
    classifier: StatusClassifier,
}

impl DebtAggregator {
    pub fn new(classifier: StatusClassifier) -> Self {
        Self { classifier }
    }

    /// Sum the outstanding balance of every contract classified `BadDebt`.
    ///
    /// Every contract is reclassified here; the stored `debit_status` is
    /// never trusted. Both product lines count the same way.
    pub fn aggregate(&self, contracts: &[Contract], as_of: NaiveDate) -> Result<DebtSummary> {
        let mut seen = HashSet::with_capacity(contracts.len());
        let mut total: Money = 0;

        for contract in contracts {
            if !seen.insert(contract.id) {
                return Err(IntegrityError::DuplicateContract {
                    contract_id: contract.id,
                });
            }
            if self.classifier.classify_contract(contract, as_of)? == DebitStatus::BadDebt {
                total = total.checked_add(contract.outstanding()).ok_or(
                    IntegrityError::DebtOverflow {
                        contract_id: contract.id,
                    },
                )?;
            }
        }

        Ok(DebtSummary::from_total(total))
    }

    /// Like [`aggregate`](Self::aggregate), rejecting contracts owned by
    /// anyone other than `customer_id`.
    pub fn aggregate_for(
        &self,
        customer_id: Uuid,
        contracts: &[Contract],
        as_of: NaiveDate,
    ) -> Result<DebtSummary> {
        if let Some(foreign) = contracts.iter().find(|c| c.customer_id != customer_id) {
            return Err(IntegrityError::ForeignContract {
                contract_id: foreign.id,
                expected: customer_id,
                actual: foreign.customer_id,
            });
        }
        self.aggregate(contracts, as_of)
    }
}

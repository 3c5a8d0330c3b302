//! Cash mirror projection.
//!
//! Builds the status string and payment snapshot stored on a contract's
//! receipt cash-flow row. The snapshot is plain JSON with a fixed field
//! order so an unchanged history always encodes to the same bytes.

use chrono::NaiveDate;
use serde::Serialize;

use super::classifier::ordered_history;
use super::error::{IntegrityError, Result};
use crate::model::{CashMirrorRecord, DebitStatus, Money, PaymentPeriod};

/// Values written to a [`CashMirrorRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashMirrorPayload {
    pub status: String,
    pub snapshot: String,
}

impl CashMirrorPayload {
    /// Whether the mirror row already holds these values.
    pub fn matches(&self, record: &CashMirrorRecord) -> bool {
        record.status == self.status && record.payment_snapshot == self.snapshot
    }
}

#[derive(Debug, Serialize)]
struct SnapshotPeriod {
    sequence: u32,
    due_date: NaiveDate,
    interest_due: Money,
    principal_due: Money,
    paid_amount: Money,
    paid_date: Option<NaiveDate>,
    paid: bool,
    maturity: bool,
    deduction: bool,
    root_money: bool,
}

#[derive(Debug, Serialize)]
struct Snapshot {
    status: DebitStatus,
    total_due: Money,
    total_paid: Money,
    outstanding: Money,
    periods: Vec<SnapshotPeriod>,
}

/// Project a classified history onto its mirror payload.
pub fn project(status: DebitStatus, history: &[PaymentPeriod]) -> Result<CashMirrorPayload> {
    let ordered = ordered_history(history)?;

    let periods: Vec<SnapshotPeriod> = ordered
        .iter()
        .map(|p| SnapshotPeriod {
            sequence: p.sequence,
            due_date: p.due_date,
            interest_due: p.interest_due,
            principal_due: p.principal_due,
            paid_amount: p.paid_amount,
            paid_date: p.paid_date,
            paid: p.is_settled(),
            maturity: p.is_maturity,
            deduction: p.is_deduction,
            root_money: p.is_root_money,
        })
        .collect();

    let snapshot = Snapshot {
        status,
        total_due: ordered.iter().map(|p| p.expected_total()).sum(),
        total_paid: ordered.iter().map(|p| p.paid_amount).sum(),
        outstanding: ordered.iter().map(|p| p.outstanding()).sum(),
        periods,
    };

    let snapshot =
        serde_json::to_string(&snapshot).map_err(|e| IntegrityError::Snapshot(e.to_string()))?;

    Ok(CashMirrorPayload {
        status: status.as_str().to_string(),
        snapshot,
    })
}

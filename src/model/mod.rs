//! Ledger entities.
//!
//! A contract is either an installment loan or a pawn loan; both share one
//! shape and are told apart by [`ProductType`]. Payment periods, customers and
//! cash mirror rows hang off contracts.

mod contract;
mod payment;

pub use contract::{CashMirrorRecord, Contract, Customer, DebitStatus, ProductType};
pub use payment::{PaymentPeriod, PaymentState};

/// Monetary amount in the smallest currency unit.
pub type Money = i64;

//! Pure ledger computations.
//!
//! Nothing in here performs I/O or reads the clock. Every function takes the
//! evaluation date explicitly and reports malformed input as an
//! [`IntegrityError`].

pub mod aggregator;
pub mod classifier;
pub mod error;
pub mod mirror;

pub use aggregator::{DebtAggregator, DebtSummary};
pub use classifier::{BadDebtPolicy, StatusClassifier};
pub use error::IntegrityError;
pub use mirror::{project, CashMirrorPayload};

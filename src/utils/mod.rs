//! Shared helpers for binaries and the reconciliation runtime.

pub mod bootstrap;
pub mod retry;

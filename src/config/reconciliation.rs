//! Reconciliation configuration types.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

use super::ConfigError;
use crate::ledger::BadDebtPolicy;

/// Bad-debt thresholds.
///
/// These are business settings with no default; a deployment must set
/// `overdue_days` explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BadDebtConfig {
    /// Days past due after which a period is bad debt.
    pub overdue_days: Option<u32>,
    /// Overdue unpaid amount, as basis points of principal, that makes a
    /// contract bad debt regardless of age.
    pub principal_ratio_bps: Option<u32>,
}

/// Reconciliation runtime configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub bad_debt: BadDebtConfig,
    /// Bounded wait for the per-contract lock.
    /// Default: 5000
    pub lock_timeout_ms: u64,
    /// Retries after a transient storage failure.
    /// Default: 3
    pub storage_retries: usize,
    /// Default: 10
    pub retry_min_delay_ms: u64,
    /// Default: 500
    pub retry_max_delay_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            bad_debt: BadDebtConfig::default(),
            lock_timeout_ms: 5_000,
            storage_retries: 3,
            retry_min_delay_ms: 10,
            retry_max_delay_ms: 500,
        }
    }
}

impl ReconciliationConfig {
    /// Bad-debt policy, failing when the threshold is not configured.
    pub fn policy(&self) -> Result<BadDebtPolicy, ConfigError> {
        let overdue_days = self
            .bad_debt
            .overdue_days
            .ok_or(ConfigError::Missing("reconciliation.bad_debt.overdue_days"))?;

        let mut policy = BadDebtPolicy::new(overdue_days);
        if let Some(bps) = self.bad_debt.principal_ratio_bps {
            if bps == 0 || bps > 10_000 {
                return Err(ConfigError::Invalid {
                    key: "reconciliation.bad_debt.principal_ratio_bps",
                    reason: format!("{bps} is outside 1..=10000"),
                });
            }
            policy = policy.with_principal_ratio_bps(bps);
        }
        Ok(policy)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Backoff between storage retries.
    pub fn storage_backoff(&self) -> ExponentialBuilder {
        crate::utils::retry::storage_backoff(
            Duration::from_millis(self.retry_min_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
            self.storage_retries,
        )
    }
}

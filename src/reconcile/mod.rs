//! Reconciliation runtime.
//!
//! [`Reconciler`] recomputes a contract's debit status, its customer's
//! bad-debt figures and its cash mirror row after a payment-history change,
//! committing all three in one storage transaction.
//!
//! Calls for the same contract are serialized through [`ContractLocks`].
//! Once the lock is held the unit of work runs on its own task, so dropping
//! the caller's future never interrupts a transaction between its first
//! write and commit or rollback.

mod clock;
mod error;
mod locks;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ReconcileError, Result};
pub use locks::{ContractGuard, ContractLocks};

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, ReconciliationConfig};
use crate::ledger::{mirror, BadDebtPolicy, DebtAggregator, DebtSummary, IntegrityError, StatusClassifier};
use crate::model::{Contract, DebitStatus, PaymentState};
use crate::storage::{LedgerStore, LedgerTransaction, StorageError};
use crate::utils::retry::{default_storage_backoff, is_retryable_storage};

/// Default bounded wait for the per-contract lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Derived rows written by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSet {
    pub contract: bool,
    pub customer: bool,
    pub mirror: bool,
}

impl WriteSet {
    pub fn count(&self) -> usize {
        [self.contract, self.customer, self.mirror]
            .into_iter()
            .filter(|w| *w)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Result of a committed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub contract_id: Uuid,
    pub customer_id: Uuid,
    /// Status stored before this run.
    pub previous: DebitStatus,
    pub status: DebitStatus,
    pub debt: DebtSummary,
    pub writes: WriteSet,
}

impl ReconcileOutcome {
    pub fn changed_status(&self) -> bool {
        self.previous != self.status
    }
}

/// Per-contract results of [`Reconciler::reconcile_all`].
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub reconciled: Vec<ReconcileOutcome>,
    pub failed: Vec<(Uuid, ReconcileError)>,
}

impl BackfillReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Orchestrates reconciliation against a [`LedgerStore`].
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    classifier: StatusClassifier,
    aggregator: DebtAggregator,
    clock: Arc<dyn Clock>,
    locks: ContractLocks,
    lock_timeout: Duration,
    backoff: ExponentialBuilder,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>, policy: BadDebtPolicy) -> Self {
        let classifier = StatusClassifier::new(policy);
        Self {
            store,
            classifier,
            aggregator: DebtAggregator::new(classifier),
            clock: Arc::new(SystemClock),
            locks: ContractLocks::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            backoff: default_storage_backoff(),
        }
    }

    /// Build from configuration; fails when the bad-debt threshold is unset.
    pub fn from_config(
        store: Arc<dyn LedgerStore>,
        config: &ReconciliationConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(store, config.policy()?)
            .with_lock_timeout(config.lock_timeout())
            .with_backoff(config.storage_backoff()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn policy(&self) -> &BadDebtPolicy {
        self.classifier.policy()
    }

    /// Lock registry shared by every clone of this reconciler.
    pub fn locks(&self) -> &ContractLocks {
        &self.locks
    }

    /// Reconcile `contract_id` as of today.
    pub async fn reconcile(&self, contract_id: Uuid) -> Result<ReconcileOutcome> {
        self.reconcile_as_of(contract_id, self.clock.today()).await
    }

    /// Reconcile `contract_id` as of an explicit date.
    pub async fn reconcile_as_of(
        &self,
        contract_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<ReconcileOutcome> {
        let guard = self.locks.acquire(contract_id, self.lock_timeout).await?;

        let this = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.run_with_retry(contract_id, as_of).await
        });

        task.await.map_err(|e| ReconcileError::Aborted {
            contract_id,
            reason: e.to_string(),
        })?
    }

    /// Re-derive every contract as of `as_of`, in contract id order.
    ///
    /// A failing contract is recorded and the backfill moves on.
    pub async fn reconcile_all(&self, as_of: NaiveDate) -> Result<BackfillReport> {
        let ids = self.store.contract_ids().await?;
        info!(contracts = ids.len(), %as_of, "Starting backfill");

        let mut report = BackfillReport::default();
        for contract_id in ids {
            match self.reconcile_as_of(contract_id, as_of).await {
                Ok(outcome) => report.reconciled.push(outcome),
                Err(e) => {
                    warn!(%contract_id, error = %e, "Backfill failed for contract");
                    report.failed.push((contract_id, e));
                }
            }
        }

        info!(
            reconciled = report.reconciled.len(),
            failed = report.failed.len(),
            "Backfill complete"
        );
        Ok(report)
    }

    async fn run_with_retry(&self, contract_id: Uuid, as_of: NaiveDate) -> Result<ReconcileOutcome> {
        let mut backoff_iter = self.backoff.build();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match self.run_once(contract_id, as_of).await {
                Ok(outcome) => return Ok(outcome),
                Err(ReconcileError::Storage {
                    source: StorageError::Busy(reason),
                    ..
                }) => {
                    debug!(%contract_id, %reason, "Storage lock wait expired");
                    return Err(ReconcileError::LockContention {
                        contract_id,
                        waited: self.lock_timeout,
                    });
                }
                Err(ReconcileError::Storage { source, .. }) if is_retryable_storage(&source) => {
                    match backoff_iter.next() {
                        Some(delay) => {
                            warn!(
                                %contract_id,
                                attempt,
                                error = %source,
                                "Storage failure, retrying in {:?}",
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(%contract_id, attempts = attempt, error = %source, "Storage retries exhausted");
                            return Err(ReconcileError::Storage {
                                attempts: attempt,
                                source,
                            });
                        }
                    }
                }
                Err(ReconcileError::Storage { source, .. }) => {
                    return Err(ReconcileError::Storage {
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One transaction: apply the derived writes, then commit or roll back.
    async fn run_once(&self, contract_id: Uuid, as_of: NaiveDate) -> Result<ReconcileOutcome> {
        let mut tx = self.store.begin().await?;

        match self.apply(tx.as_mut(), contract_id, as_of).await {
            Ok(outcome) => {
                tx.commit().await?;
                if outcome.changed_status() {
                    info!(
                        %contract_id,
                        customer_id = %outcome.customer_id,
                        from = %outcome.previous,
                        to = %outcome.status,
                        "Debit status changed"
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(%contract_id, error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn LedgerTransaction,
        contract_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<ReconcileOutcome> {
        let contract = tx
            .lock_contract(contract_id)
            .await?
            .ok_or(ReconcileError::ContractNotFound(contract_id))?;

        let mut writes = WriteSet::default();

        let status = self.classifier.classify_contract(&contract, as_of)?;
        let settled_date = settled_date(&contract, status);
        if status != contract.debit_status || settled_date != contract.settled_date {
            tx.update_contract_status(contract_id, status, settled_date)
                .await?;
            writes.contract = true;
        } else {
            debug!(%contract_id, %status, "Contract status unchanged");
        }

        let customer = tx
            .load_customer(contract.customer_id)
            .await?
            .ok_or(IntegrityError::MissingCustomer {
                contract_id,
                customer_id: contract.customer_id,
            })?;
        let contracts = tx.load_customer_contracts(customer.id).await?;
        let debt = self.aggregator.aggregate_for(customer.id, &contracts, as_of)?;
        if debt != DebtSummary::stored(&customer) {
            tx.update_customer_debt(customer.id, &debt).await?;
            writes.customer = true;
        } else {
            debug!(customer_id = %customer.id, "Customer debt unchanged");
        }

        if let Some(record) = tx.load_cash_mirror(contract_id).await? {
            let payload = mirror::project(status, &contract.periods)?;
            if !payload.matches(&record) {
                tx.update_cash_mirror(record.id, &payload).await?;
                writes.mirror = true;
            } else {
                debug!(%contract_id, mirror_id = %record.id, "Cash mirror unchanged");
            }
        }

        Ok(ReconcileOutcome {
            contract_id,
            customer_id: customer.id,
            previous: contract.debit_status,
            status,
            debt,
            writes,
        })
    }
}

/// Settlement date implied by `status`: the maturity period's paid date once
/// completed, nothing otherwise.
fn settled_date(contract: &Contract, status: DebitStatus) -> Option<NaiveDate> {
    if status != DebitStatus::Completed {
        return None;
    }
    contract
        .periods
        .iter()
        .filter(|p| p.is_maturity && p.state == PaymentState::Paid)
        .filter_map(|p| p.paid_date)
        .max()
}

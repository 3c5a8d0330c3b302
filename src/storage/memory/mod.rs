//! In-memory storage implementation.
//!
//! Transactions stage their writes and apply them in one step at commit, so
//! a failed or dropped transaction leaves no trace. One transaction runs at a
//! time: `begin` takes the store-wide writer guard and the transaction holds
//! it until commit, rollback or drop. Fault hooks let tests fail a specific
//! write or the next commits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LedgerStore, LedgerTransaction, PaymentUpdate, Result, StorageError};
use crate::ledger::{CashMirrorPayload, DebtSummary};
use crate::model::{CashMirrorRecord, Contract, Customer, DebitStatus, PaymentPeriod};

/// Derived write issued by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteTarget {
    Contract,
    Customer,
    CashMirror,
}

struct StoredPeriod {
    period: PaymentPeriod,
    deleted: bool,
}

/// Contract row; `contract.periods` is kept empty, rows live in `periods`.
struct StoredContract {
    contract: Contract,
    periods: Vec<StoredPeriod>,
}

impl StoredContract {
    fn materialize(&self) -> Contract {
        let mut live: Vec<PaymentPeriod> = self
            .periods
            .iter()
            .filter(|p| !p.deleted)
            .map(|p| p.period.clone())
            .collect();
        live.sort_by_key(|p| p.sequence);

        let mut contract = self.contract.clone();
        contract.periods = live;
        contract
    }

    fn live_period_mut(&mut self, sequence: u32) -> Option<&mut StoredPeriod> {
        self.periods
            .iter_mut()
            .find(|p| !p.deleted && p.period.sequence == sequence)
    }
}

#[derive(Default)]
struct LedgerState {
    customers: HashMap<Uuid, Customer>,
    contracts: HashMap<Uuid, StoredContract>,
    mirrors: HashMap<Uuid, CashMirrorRecord>,
}

impl LedgerState {
    fn contract(&self, id: Uuid) -> Option<Contract> {
        self.contracts.get(&id).map(StoredContract::materialize)
    }

    fn customer_contracts(&self, customer_id: Uuid) -> Vec<Contract> {
        let mut contracts: Vec<Contract> = self
            .contracts
            .values()
            .filter(|c| c.contract.customer_id == customer_id)
            .map(StoredContract::materialize)
            .collect();
        contracts.sort_by_key(|c| c.id);
        contracts
    }

    fn mirror_for(&self, contract_id: Uuid) -> Option<CashMirrorRecord> {
        self.mirrors
            .values()
            .find(|m| m.contract_id == Some(contract_id))
            .cloned()
    }
}

/// How long `begin` waits for the writer guard before reporting `Busy`.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Shared {
    state: RwLock<LedgerState>,
    writer: Arc<Mutex<()>>,
    fail_on_write: RwLock<Option<WriteTarget>>,
    failing_commits: RwLock<u32>,
    writes: AtomicU64,
}

/// In-memory ledger store.
#[derive(Clone)]
pub struct MemoryLedgerStore {
    shared: Arc<Shared>,
    busy_timeout: Duration,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self {
            shared: Arc::default(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Make every staged write to `target` fail until cleared.
    pub async fn set_fail_on_write(&self, target: Option<WriteTarget>) {
        *self.shared.fail_on_write.write().await = target;
    }

    /// Fail the next `count` commits with a transient error.
    pub async fn fail_next_commits(&self, count: u32) {
        *self.shared.failing_commits.write().await = count;
    }

    /// Derived rows written by committed transactions so far.
    pub fn write_count(&self) -> u64 {
        self.shared.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let writer = Arc::clone(&self.shared.writer).lock_owned();
        let writer = tokio::time::timeout(self.busy_timeout, writer)
            .await
            .map_err(|_| {
                StorageError::Busy(format!(
                    "writer guard not acquired within {:?}",
                    self.busy_timeout
                ))
            })?;

        Ok(Box::new(MemoryLedgerTransaction {
            shared: Arc::clone(&self.shared),
            staged: Vec::new(),
            _writer: writer,
        }))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<()> {
        let mut customer = customer.clone();
        customer.is_debt = false;
        customer.debt_money = 0;

        let mut state = self.shared.state.write().await;
        state.customers.insert(customer.id, customer);
        Ok(())
    }

    async fn open_contract(&self, contract: &Contract) -> Result<()> {
        let mut state = self.shared.state.write().await;
        if !state.customers.contains_key(&contract.customer_id) {
            return Err(StorageError::not_found("customer", contract.customer_id));
        }

        let mut row = contract.clone();
        row.debit_status = DebitStatus::Current;
        row.settled_date = None;
        let periods = std::mem::take(&mut row.periods)
            .into_iter()
            .map(|period| StoredPeriod {
                period,
                deleted: false,
            })
            .collect();

        state.contracts.insert(
            row.id,
            StoredContract {
                contract: row,
                periods,
            },
        );
        Ok(())
    }

    async fn attach_cash_mirror(&self, record: &CashMirrorRecord) -> Result<()> {
        let mut record = record.clone();
        record.status.clear();
        record.payment_snapshot.clear();

        let mut state = self.shared.state.write().await;
        state.mirrors.insert(record.id, record);
        Ok(())
    }

    async fn record_payment(
        &self,
        contract_id: Uuid,
        sequence: u32,
        update: &PaymentUpdate,
    ) -> Result<()> {
        let mut state = self.shared.state.write().await;
        let stored = state
            .contracts
            .get_mut(&contract_id)
            .and_then(|c| c.live_period_mut(sequence))
            .ok_or_else(|| {
                StorageError::not_found("payment period", format!("{contract_id}#{sequence}"))
            })?;

        stored.period.paid_amount = update.paid_amount;
        stored.period.paid_date = update.paid_date;
        stored.period.state = update.state;
        Ok(())
    }

    async fn append_periods(&self, contract_id: Uuid, periods: &[PaymentPeriod]) -> Result<()> {
        let mut state = self.shared.state.write().await;
        let contract = state
            .contracts
            .get_mut(&contract_id)
            .ok_or_else(|| StorageError::not_found("contract", contract_id))?;

        contract
            .periods
            .extend(periods.iter().cloned().map(|period| StoredPeriod {
                period,
                deleted: false,
            }));
        Ok(())
    }

    async fn soft_delete_period(&self, contract_id: Uuid, sequence: u32) -> Result<()> {
        let mut state = self.shared.state.write().await;
        let stored = state
            .contracts
            .get_mut(&contract_id)
            .and_then(|c| c.live_period_mut(sequence))
            .ok_or_else(|| {
                StorageError::not_found("payment period", format!("{contract_id}#{sequence}"))
            })?;

        stored.deleted = true;
        Ok(())
    }

    async fn contract(&self, id: Uuid) -> Result<Option<Contract>> {
        Ok(self.shared.state.read().await.contract(id))
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>> {
        Ok(self.shared.state.read().await.customers.get(&id).cloned())
    }

    async fn cash_mirror_for(&self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>> {
        Ok(self.shared.state.read().await.mirror_for(contract_id))
    }

    async fn contract_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.shared.state.read().await;
        let mut ids: Vec<Uuid> = state.contracts.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

enum StagedWrite {
    ContractStatus {
        id: Uuid,
        status: DebitStatus,
        settled_date: Option<NaiveDate>,
    },
    CustomerDebt {
        id: Uuid,
        summary: DebtSummary,
    },
    CashMirror {
        id: Uuid,
        payload: CashMirrorPayload,
    },
}

/// Unit of work over [`MemoryLedgerStore`].
///
/// Reads see committed state; the writer guard keeps any other transaction
/// from committing between those reads and this transaction's commit.
pub struct MemoryLedgerTransaction {
    shared: Arc<Shared>,
    staged: Vec<StagedWrite>,
    _writer: OwnedMutexGuard<()>,
}

impl MemoryLedgerTransaction {
    async fn check_fault(&self, target: WriteTarget) -> Result<()> {
        if *self.shared.fail_on_write.read().await == Some(target) {
            return Err(StorageError::Unavailable(format!(
                "injected failure writing {target:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for MemoryLedgerTransaction {
    async fn lock_contract(&mut self, id: Uuid) -> Result<Option<Contract>> {
        Ok(self.shared.state.read().await.contract(id))
    }

    async fn load_customer(&mut self, id: Uuid) -> Result<Option<Customer>> {
        Ok(self.shared.state.read().await.customers.get(&id).cloned())
    }

    async fn load_customer_contracts(&mut self, customer_id: Uuid) -> Result<Vec<Contract>> {
        Ok(self.shared.state.read().await.customer_contracts(customer_id))
    }

    async fn load_cash_mirror(&mut self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>> {
        Ok(self.shared.state.read().await.mirror_for(contract_id))
    }

    async fn update_contract_status(
        &mut self,
        id: Uuid,
        status: DebitStatus,
        settled_date: Option<NaiveDate>,
    ) -> Result<()> {
        self.check_fault(WriteTarget::Contract).await?;
        if !self.shared.state.read().await.contracts.contains_key(&id) {
            return Err(StorageError::not_found("contract", id));
        }
        self.staged.push(StagedWrite::ContractStatus {
            id,
            status,
            settled_date,
        });
        Ok(())
    }

    async fn update_customer_debt(&mut self, id: Uuid, summary: &DebtSummary) -> Result<()> {
        self.check_fault(WriteTarget::Customer).await?;
        if !self.shared.state.read().await.customers.contains_key(&id) {
            return Err(StorageError::not_found("customer", id));
        }
        self.staged.push(StagedWrite::CustomerDebt {
            id,
            summary: *summary,
        });
        Ok(())
    }

    async fn update_cash_mirror(&mut self, id: Uuid, payload: &CashMirrorPayload) -> Result<()> {
        self.check_fault(WriteTarget::CashMirror).await?;
        if !self.shared.state.read().await.mirrors.contains_key(&id) {
            return Err(StorageError::not_found("cash mirror", id));
        }
        self.staged.push(StagedWrite::CashMirror {
            id,
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryLedgerTransaction {
            shared,
            staged,
            _writer,
        } = *self;
        {
            let mut failing = shared.failing_commits.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(StorageError::Unavailable("injected commit failure".to_string()));
            }
        }

        let mut state = shared.state.write().await;
        let applied = staged.len() as u64;
        for write in staged {
            match write {
                StagedWrite::ContractStatus {
                    id,
                    status,
                    settled_date,
                } => {
                    if let Some(stored) = state.contracts.get_mut(&id) {
                        stored.contract.debit_status = status;
                        stored.contract.settled_date = settled_date;
                    }
                }
                StagedWrite::CustomerDebt { id, summary } => {
                    if let Some(customer) = state.customers.get_mut(&id) {
                        customer.is_debt = summary.is_debt;
                        customer.debt_money = summary.total_bad_debt;
                    }
                }
                StagedWrite::CashMirror { id, payload } => {
                    if let Some(mirror) = state.mirrors.get_mut(&id) {
                        mirror.status = payload.status;
                        mirror.payment_snapshot = payload.snapshot;
                    }
                }
            }
        }
        shared.writes.fetch_add(applied, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use lendledger::ledger::{CashMirrorPayload, DebtSummary};
use lendledger::model::{
    CashMirrorRecord, Contract, Customer, DebitStatus, PaymentPeriod, ProductType,
};
use lendledger::reconcile::{FixedClock, Reconciler};
use lendledger::storage::{LedgerStore, LedgerTransaction, PaymentUpdate, Result};
use lendledger::utils::retry::storage_backoff;
use lendledger::BadDebtPolicy;

pub const MILLION: i64 = 1_000_000;

/// Bad-debt threshold used by every scenario.
pub const OVERDUE_DAYS: u32 = 30;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Evaluation date shared by the scenarios.
pub fn today() -> NaiveDate {
    date(2024, 6, 30)
}

pub fn days_ago(days: u64) -> NaiveDate {
    today().checked_sub_days(Days::new(days)).unwrap()
}

pub fn reconciler(store: Arc<dyn LedgerStore>) -> Reconciler {
    Reconciler::new(store, BadDebtPolicy::new(OVERDUE_DAYS))
        .with_clock(Arc::new(FixedClock(today())))
        .with_lock_timeout(Duration::from_secs(5))
        .with_backoff(storage_backoff(
            Duration::from_millis(1),
            Duration::from_millis(5),
            3,
        ))
}

pub async fn customer(store: &dyn LedgerStore, name: &str) -> Customer {
    let customer = Customer::new(name);
    store.create_customer(&customer).await.unwrap();
    customer
}

/// Open `periods` as a contract of `customer`, with its cash mirror row.
pub async fn open(
    store: &dyn LedgerStore,
    customer: &Customer,
    product: ProductType,
    periods: Vec<PaymentPeriod>,
) -> Contract {
    let principal = periods
        .iter()
        .fold(0i64, |sum, p| sum.saturating_add(p.principal_due));
    let contract = Contract::open(product, customer.id, Uuid::new_v4(), principal, date(2024, 1, 1))
        .with_periods(periods);
    store.open_contract(&contract).await.unwrap();
    store
        .attach_cash_mirror(&CashMirrorRecord::for_contract(&contract))
        .await
        .unwrap();
    contract
}

/// Three monthly periods of one million each; periods 1 and 2 paid on time,
/// period 3 (maturity) due `last_due_days_ago` days ago and unpaid.
pub fn three_month_schedule(last_due_days_ago: u64) -> Vec<PaymentPeriod> {
    let third = days_ago(last_due_days_ago);
    let second = third.checked_sub_days(Days::new(30)).unwrap();
    let first = second.checked_sub_days(Days::new(30)).unwrap();

    vec![
        PaymentPeriod::new(1, first, 0, MILLION).paid_on(first),
        PaymentPeriod::new(2, second, 0, MILLION).paid_on(second),
        PaymentPeriod::new(3, third, 0, MILLION).maturity(),
    ]
}

// =============================================================================
// Pausing store
// =============================================================================

struct Pause {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Control side of a parked transaction.
pub struct PauseHandle {
    reached: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl PauseHandle {
    /// Wait until the transaction has read the customer's contracts.
    pub async fn reached(&mut self) {
        (&mut self.reached).await.unwrap();
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Store wrapper that can park one transaction inside its unit of work,
/// right after it has loaded the customer's contracts.
pub struct PausingStore {
    inner: Arc<dyn LedgerStore>,
    armed: Mutex<Option<Pause>>,
}

impl PausingStore {
    pub fn new(inner: Arc<dyn LedgerStore>) -> Self {
        Self {
            inner,
            armed: Mutex::new(None),
        }
    }

    /// Park the next transaction begun on this store.
    pub async fn pause_next(&self) -> PauseHandle {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.armed.lock().await = Some(Pause {
            reached: reached_tx,
            release: release_rx,
        });
        PauseHandle {
            reached: reached_rx,
            release: release_tx,
        }
    }
}

#[async_trait]
impl LedgerStore for PausingStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let inner = self.inner.begin().await?;
        let pause = self.armed.lock().await.take();
        Ok(Box::new(PausingTransaction { inner, pause }))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<()> {
        self.inner.create_customer(customer).await
    }

    async fn open_contract(&self, contract: &Contract) -> Result<()> {
        self.inner.open_contract(contract).await
    }

    async fn attach_cash_mirror(&self, record: &CashMirrorRecord) -> Result<()> {
        self.inner.attach_cash_mirror(record).await
    }

    async fn record_payment(
        &self,
        contract_id: Uuid,
        sequence: u32,
        update: &PaymentUpdate,
    ) -> Result<()> {
        self.inner.record_payment(contract_id, sequence, update).await
    }

    async fn append_periods(&self, contract_id: Uuid, periods: &[PaymentPeriod]) -> Result<()> {
        self.inner.append_periods(contract_id, periods).await
    }

    async fn soft_delete_period(&self, contract_id: Uuid, sequence: u32) -> Result<()> {
        self.inner.soft_delete_period(contract_id, sequence).await
    }

    async fn contract(&self, id: Uuid) -> Result<Option<Contract>> {
        self.inner.contract(id).await
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>> {
        self.inner.customer(id).await
    }

    async fn cash_mirror_for(&self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>> {
        self.inner.cash_mirror_for(contract_id).await
    }

    async fn contract_ids(&self) -> Result<Vec<Uuid>> {
        self.inner.contract_ids().await
    }
}

struct PausingTransaction {
    inner: Box<dyn LedgerTransaction>,
    pause: Option<Pause>,
}

#[async_trait]
impl LedgerTransaction for PausingTransaction {
    async fn lock_contract(&mut self, id: Uuid) -> Result<Option<Contract>> {
        self.inner.lock_contract(id).await
    }

    async fn load_customer(&mut self, id: Uuid) -> Result<Option<Customer>> {
        self.inner.load_customer(id).await
    }

    async fn load_customer_contracts(&mut self, customer_id: Uuid) -> Result<Vec<Contract>> {
        let contracts = self.inner.load_customer_contracts(customer_id).await?;
        if let Some(pause) = self.pause.take() {
            let _ = pause.reached.send(());
            let _ = pause.release.await;
        }
        Ok(contracts)
    }

    async fn load_cash_mirror(&mut self, contract_id: Uuid) -> Result<Option<CashMirrorRecord>> {
        self.inner.load_cash_mirror(contract_id).await
    }

    async fn update_contract_status(
        &mut self,
        id: Uuid,
        status: DebitStatus,
        settled_date: Option<NaiveDate>,
    ) -> Result<()> {
        self.inner.update_contract_status(id, status, settled_date).await
    }

    async fn update_customer_debt(&mut self, id: Uuid, summary: &DebtSummary) -> Result<()> {
        self.inner.update_customer_debt(id, summary).await
    }

    async fn update_cash_mirror(&mut self, id: Uuid, payload: &CashMirrorPayload) -> Result<()> {
        self.inner.update_cash_mirror(id, payload).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }
}

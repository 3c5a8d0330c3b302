//! Reconciliation scenarios.
//!
//! Every function gets a fresh store and checks the committed state through
//! the store's read operations only.

use std::sync::Arc;
use std::time::Duration;

use lendledger::ledger::DebtSummary;
use lendledger::model::{DebitStatus, PaymentPeriod, ProductType};
use lendledger::reconcile::ReconcileError;
use lendledger::storage::{LedgerStore, PaymentUpdate};

use crate::common::*;

// =============================================================================
// Classification and aggregation
// =============================================================================

pub async fn test_overdue_maturity_is_bad_debt(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "bad debt").await;
    let contract = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(40),
    )
    .await;
    let reconciler = reconciler(Arc::clone(&store));

    let outcome = reconciler.reconcile(contract.id).await.unwrap();
    assert_eq!(outcome.status, DebitStatus::BadDebt);

    let with_unpaid = store.customer(customer.id).await.unwrap().unwrap();
    assert!(with_unpaid.is_debt);

    store
        .record_payment(
            contract.id,
            3,
            &PaymentUpdate::settle(&contract.periods[2], today()),
        )
        .await
        .unwrap();
    reconciler.reconcile(contract.id).await.unwrap();

    let with_paid = store.customer(customer.id).await.unwrap().unwrap();
    assert_eq!(with_unpaid.debt_money - with_paid.debt_money, MILLION);
    assert!(!with_paid.is_debt);
}

pub async fn test_young_overdue_period_is_late(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "late").await;
    let contract = open(
        store.as_ref(),
        &customer,
        ProductType::Pawn,
        three_month_schedule(10),
    )
    .await;

    let outcome = reconciler(Arc::clone(&store))
        .reconcile(contract.id)
        .await
        .unwrap();
    assert_eq!(outcome.status, DebitStatus::Late);
    assert_eq!(outcome.debt, DebtSummary::default());

    let stored = store.contract(contract.id).await.unwrap().unwrap();
    assert_eq!(stored.debit_status, DebitStatus::Late);
}

pub async fn test_settlement_completes_contract(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "settles").await;
    let contract = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(10),
    )
    .await;
    let reconciler = reconciler(Arc::clone(&store));
    assert_eq!(
        reconciler.reconcile(contract.id).await.unwrap().status,
        DebitStatus::Late
    );

    store
        .record_payment(
            contract.id,
            3,
            &PaymentUpdate::settle(&contract.periods[2], today()),
        )
        .await
        .unwrap();
    let outcome = reconciler.reconcile(contract.id).await.unwrap();
    assert_eq!(outcome.previous, DebitStatus::Late);
    assert_eq!(outcome.status, DebitStatus::Completed);

    let stored = store.contract(contract.id).await.unwrap().unwrap();
    assert_eq!(stored.settled_date, Some(today()));

    let mirror = store.cash_mirror_for(contract.id).await.unwrap().unwrap();
    assert_eq!(mirror.status, stored.debit_status.as_str());
    assert!(mirror.payment_snapshot.contains("\"COMPLETED\""));
}

pub async fn test_settling_bad_debt_releases_its_contribution(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "two bad contracts").await;
    let first = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(40),
    )
    .await;
    let second = open(
        store.as_ref(),
        &customer,
        ProductType::Pawn,
        vec![PaymentPeriod::new(1, days_ago(90), 50_000, 500_000).maturity()],
    )
    .await;
    let reconciler = reconciler(Arc::clone(&store));

    reconciler.reconcile(first.id).await.unwrap();
    let outcome = reconciler.reconcile(second.id).await.unwrap();
    assert_eq!(outcome.debt.total_bad_debt, MILLION + 550_000);

    store
        .record_payment(
            first.id,
            3,
            &PaymentUpdate::settle(&first.periods[2], today()),
        )
        .await
        .unwrap();
    let outcome = reconciler.reconcile(first.id).await.unwrap();
    assert_eq!(outcome.status, DebitStatus::Completed);
    assert_eq!(outcome.debt, DebtSummary::from_total(550_000));

    let stored = store.customer(customer.id).await.unwrap().unwrap();
    assert_eq!(stored.debt_money, 550_000);
    assert!(stored.is_debt);
}

pub async fn test_both_product_lines_aggregate(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "mixed products").await;
    let installment = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(45),
    )
    .await;
    let pawn = open(
        store.as_ref(),
        &customer,
        ProductType::Pawn,
        vec![PaymentPeriod::new(1, days_ago(60), 0, 2 * MILLION).maturity()],
    )
    .await;
    let reconciler = reconciler(Arc::clone(&store));

    // Either contract's reconciliation recomputes the full customer total.
    let via_installment = reconciler.reconcile(installment.id).await.unwrap();
    assert_eq!(via_installment.debt.total_bad_debt, 3 * MILLION);

    let via_pawn = reconciler.reconcile(pawn.id).await.unwrap();
    assert_eq!(via_pawn.debt, via_installment.debt);
    assert!(!via_pawn.writes.customer);
}

// =============================================================================
// Idempotence and history changes
// =============================================================================

pub async fn test_repeat_reconcile_is_idempotent(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "idempotent").await;
    let contract = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(40),
    )
    .await;
    let reconciler = reconciler(Arc::clone(&store));

    let first = reconciler.reconcile(contract.id).await.unwrap();
    assert_eq!(first.writes.count(), 3);
    let contract_after = store.contract(contract.id).await.unwrap();
    let customer_after = store.customer(customer.id).await.unwrap();
    let mirror_after = store.cash_mirror_for(contract.id).await.unwrap();

    let second = reconciler.reconcile(contract.id).await.unwrap();
    assert!(second.writes.is_empty());
    assert_eq!(store.contract(contract.id).await.unwrap(), contract_after);
    assert_eq!(store.customer(customer.id).await.unwrap(), customer_after);
    assert_eq!(store.cash_mirror_for(contract.id).await.unwrap(), mirror_after);
}

pub async fn test_soft_deleted_period_is_ignored(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "rescheduled").await;
    let contract = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(40),
    )
    .await;
    let reconciler = reconciler(Arc::clone(&store));
    assert_eq!(
        reconciler.reconcile(contract.id).await.unwrap().status,
        DebitStatus::BadDebt
    );

    // Reschedule the overdue maturity into the future.
    store.soft_delete_period(contract.id, 3).await.unwrap();
    store
        .append_periods(
            contract.id,
            &[PaymentPeriod::new(3, date(2024, 7, 31), 0, MILLION).maturity()],
        )
        .await
        .unwrap();

    let outcome = reconciler.reconcile(contract.id).await.unwrap();
    assert_eq!(outcome.status, DebitStatus::Current);
    assert_eq!(outcome.debt, DebtSummary::default());
}

pub async fn test_backfill_reproduces_historical_state(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "backfill").await;
    let contract = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(40),
    )
    .await;
    let reconciler = reconciler(Arc::clone(&store));

    // Before the maturity date nothing is overdue.
    let report = reconciler.reconcile_all(days_ago(41)).await.unwrap();
    assert!(report.is_clean());
    let stored = store.contract(contract.id).await.unwrap().unwrap();
    assert_eq!(stored.debit_status, DebitStatus::Current);

    // Inside the threshold.
    reconciler.reconcile_all(days_ago(20)).await.unwrap();
    let stored = store.contract(contract.id).await.unwrap().unwrap();
    assert_eq!(stored.debit_status, DebitStatus::Late);

    reconciler.reconcile_all(today()).await.unwrap();
    let stored = store.contract(contract.id).await.unwrap().unwrap();
    assert_eq!(stored.debit_status, DebitStatus::BadDebt);
}

// =============================================================================
// Concurrency and failures
// =============================================================================

pub async fn test_concurrent_reconciles_apply_in_arrival_order(store: Arc<dyn LedgerStore>) {
    let store = Arc::new(PausingStore::new(store));
    let customer = customer(store.as_ref(), "concurrent").await;
    let contract = open(
        store.as_ref(),
        &customer,
        ProductType::Installment,
        three_month_schedule(40),
    )
    .await;
    let reconciler = reconciler(store.clone());
    store
        .record_payment(contract.id, 3, &PaymentUpdate::partial(400_000, today()))
        .await
        .unwrap();

    // Park the first call inside its unit of work.
    let mut pause = store.pause_next().await;
    let contract_id = contract.id;
    let first = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.reconcile(contract_id).await }
    });
    pause.reached().await;

    let second = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.reconcile(contract_id).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished());
    pause.release();

    let first = first.await.unwrap().unwrap();
    assert_eq!(
        (first.previous, first.status),
        (DebitStatus::Current, DebitStatus::BadDebt)
    );
    assert_eq!(first.debt.total_bad_debt, 600_000);

    // The queued call starts from the first call's committed state.
    let second = second.await.unwrap().unwrap();
    assert_eq!(
        (second.previous, second.status),
        (DebitStatus::BadDebt, DebitStatus::BadDebt)
    );
    assert!(second.writes.is_empty());

    store
        .record_payment(
            contract.id,
            3,
            &PaymentUpdate::settle(&contract.periods[2], today()),
        )
        .await
        .unwrap();
    let settled = reconciler.reconcile(contract.id).await.unwrap();
    assert_eq!(
        (settled.previous, settled.status),
        (DebitStatus::BadDebt, DebitStatus::Completed)
    );

    let stored = store.customer(customer.id).await.unwrap().unwrap();
    assert_eq!(stored.debt_money, 0);
    let mirror = store.cash_mirror_for(contract.id).await.unwrap().unwrap();
    assert_eq!(mirror.status, "COMPLETED");
}

pub async fn test_sibling_reconcile_waits_for_open_transaction(store: Arc<dyn LedgerStore>) {
    let store = Arc::new(PausingStore::new(store));
    let customer = customer(store.as_ref(), "siblings").await;
    let first = open(
        store.as_ref(),
        &customer,
        ProductType::Pawn,
        vec![PaymentPeriod::new(1, days_ago(60), 0, MILLION).maturity()],
    )
    .await;
    let second = open(
        store.as_ref(),
        &customer,
        ProductType::Pawn,
        vec![PaymentPeriod::new(1, days_ago(60), 0, MILLION).maturity()],
    )
    .await;
    let reconciler = reconciler(store.clone());
    reconciler.reconcile(first.id).await.unwrap();
    reconciler.reconcile(second.id).await.unwrap();
    let stored = store.customer(customer.id).await.unwrap().unwrap();
    assert_eq!(stored.debt_money, 2 * MILLION);

    // The second contract's reconcile reads the first one as unpaid, then stalls.
    store
        .record_payment(
            second.id,
            1,
            &PaymentUpdate::settle(&second.periods[0], today()),
        )
        .await
        .unwrap();
    let mut pause = store.pause_next().await;
    let stalled = tokio::spawn({
        let reconciler = reconciler.clone();
        let id = second.id;
        async move { reconciler.reconcile(id).await }
    });
    pause.reached().await;

    // Meanwhile the first contract is settled and reconciled.
    let racing = tokio::spawn({
        let store = Arc::clone(&store);
        let reconciler = reconciler.clone();
        let first = first.clone();
        async move {
            store
                .record_payment(
                    first.id,
                    1,
                    &PaymentUpdate::settle(&first.periods[0], today()),
                )
                .await
                .unwrap();
            reconciler.reconcile(first.id).await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!racing.is_finished());
    pause.release();

    let stalled = stalled.await.unwrap().unwrap();
    assert_eq!(stalled.status, DebitStatus::Completed);
    assert_eq!(stalled.debt.total_bad_debt, MILLION);

    let racing = racing.await.unwrap().unwrap();
    assert_eq!(racing.status, DebitStatus::Completed);
    assert_eq!(racing.debt, DebtSummary::default());

    // The committed aggregate matches the committed histories.
    let stored = store.customer(customer.id).await.unwrap().unwrap();
    assert_eq!(stored.debt_money, 0);
    assert!(!stored.is_debt);
}

pub async fn test_concurrent_contracts_of_one_customer(store: Arc<dyn LedgerStore>) {
    let customer = customer(store.as_ref(), "parallel").await;
    let mut ids = Vec::new();
    for days in [35, 50, 65, 80] {
        let contract = open(
            store.as_ref(),
            &customer,
            ProductType::Pawn,
            vec![PaymentPeriod::new(1, days_ago(days), 0, MILLION).maturity()],
        )
        .await;
        ids.push(contract.id);
    }
    let reconciler = reconciler(Arc::clone(&store));

    let tasks: Vec<_> = ids
        .iter()
        .map(|id| {
            let reconciler = reconciler.clone();
            let id = *id;
            tokio::spawn(async move { reconciler.reconcile(id).await })
        })
        .collect();
    for outcome in futures::future::join_all(tasks).await {
        assert_eq!(outcome.unwrap().unwrap().debt.total_bad_debt, 4 * MILLION);
    }

    let stored = store.customer(customer.id).await.unwrap().unwrap();
    assert_eq!(stored.debt_money, 4 * MILLION);
}

pub async fn test_unknown_contract_is_not_found(store: Arc<dyn LedgerStore>) {
    let id = uuid::Uuid::new_v4();
    let err = reconciler(store).reconcile(id).await.unwrap_err();
    assert!(matches!(err, ReconcileError::ContractNotFound(missing) if missing == id));
    assert!(!err.is_retryable());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all reconciliation tests against a store factory.
///
/// `$make_store` is an async expression evaluated once per test and must
/// yield an `Arc<dyn LedgerStore>` backed by an empty ledger.
#[macro_export]
macro_rules! run_reconcile_tests {
    ($make_store:expr) => {
        use $crate::ledger::reconcile_tests::*;

        test_overdue_maturity_is_bad_debt($make_store).await;
        println!("  test_overdue_maturity_is_bad_debt: PASSED");

        test_young_overdue_period_is_late($make_store).await;
        println!("  test_young_overdue_period_is_late: PASSED");

        test_settlement_completes_contract($make_store).await;
        println!("  test_settlement_completes_contract: PASSED");

        test_settling_bad_debt_releases_its_contribution($make_store).await;
        println!("  test_settling_bad_debt_releases_its_contribution: PASSED");

        test_both_product_lines_aggregate($make_store).await;
        println!("  test_both_product_lines_aggregate: PASSED");

        test_repeat_reconcile_is_idempotent($make_store).await;
        println!("  test_repeat_reconcile_is_idempotent: PASSED");

        test_soft_deleted_period_is_ignored($make_store).await;
        println!("  test_soft_deleted_period_is_ignored: PASSED");

        test_backfill_reproduces_historical_state($make_store).await;
        println!("  test_backfill_reproduces_historical_state: PASSED");

        test_concurrent_reconciles_apply_in_arrival_order($make_store).await;
        println!("  test_concurrent_reconciles_apply_in_arrival_order: PASSED");

        test_sibling_reconcile_waits_for_open_transaction($make_store).await;
        println!("  test_sibling_reconcile_waits_for_open_transaction: PASSED");

        test_concurrent_contracts_of_one_customer($make_store).await;
        println!("  test_concurrent_contracts_of_one_customer: PASSED");

        test_unknown_contract_is_not_found($make_store).await;
        println!("  test_unknown_contract_is_not_found: PASSED");
    };
}

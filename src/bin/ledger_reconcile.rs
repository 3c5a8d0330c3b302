//! ledger-reconcile: manual reconciliation and historical backfill
//!
//! ## Usage
//! ```text
//! ledger-reconcile <contract-id>...   reconcile the given contracts
//! ledger-reconcile all                re-derive every contract
//! ```
//!
//! ## Configuration
//! - LEDGER_CONFIG: Path to a YAML config file (optional, `ledger.yaml` is read if present)
//! - LEDGER__*: Overrides, e.g. LEDGER__RECONCILIATION__BAD_DEBT__OVERDUE_DAYS=30
//! - LEDGER_AS_OF: Evaluation date as YYYY-MM-DD (default: today, UTC)
//! - LEDGER_LOG: Log filter (default: info)

use std::process::ExitCode;

use chrono::NaiveDate;
use tracing::{error, info};
use uuid::Uuid;

use lendledger::config::Config;
use lendledger::reconcile::{Clock, Reconciler, SystemClock};
use lendledger::storage::init_storage;
use lendledger::utils::bootstrap::init_tracing;

const AS_OF_ENV_VAR: &str = "LEDGER_AS_OF";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: ledger-reconcile <contract-id>... | all");
        return Ok(ExitCode::from(2));
    }

    let config = Config::load(None)?;
    let as_of = match std::env::var(AS_OF_ENV_VAR) {
        Ok(value) => NaiveDate::parse_from_str(&value, "%Y-%m-%d")?,
        Err(_) => SystemClock.today(),
    };

    let store = init_storage(&config.storage, &config.reconciliation).await?;
    let reconciler = Reconciler::from_config(store, &config.reconciliation)?;

    info!(%as_of, "ledger-reconcile started");

    if args.len() == 1 && args[0] == "all" {
        let report = reconciler.reconcile_all(as_of).await?;
        for (contract_id, e) in &report.failed {
            error!(%contract_id, error = %e, "Reconciliation failed");
        }
        return Ok(if report.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let mut failed = 0usize;
    for arg in &args {
        let contract_id: Uuid = arg.parse()?;
        match reconciler.reconcile_as_of(contract_id, as_of).await {
            Ok(outcome) => info!(
                %contract_id,
                status = %outcome.status,
                debt_money = outcome.debt.total_bad_debt,
                writes = outcome.writes.count(),
                "Reconciled"
            ),
            Err(e) => {
                error!(%contract_id, error = %e, retryable = e.is_retryable(), "Reconciliation failed");
                failed += 1;
            }
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

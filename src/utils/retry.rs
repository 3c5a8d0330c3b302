//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::storage::StorageError;

/// Backoff for retrying a reconciliation transaction after a transient
/// storage failure.
pub fn storage_backoff(min_delay: Duration, max_delay: Duration, retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay)
        .with_max_times(retries)
        .with_jitter()
}

/// Backoff used when no configuration is supplied.
///
/// - Min delay: 10ms
/// - Max delay: 500ms
/// - Max retries: 3
/// - Jitter enabled
pub fn default_storage_backoff() -> ExponentialBuilder {
    storage_backoff(Duration::from_millis(10), Duration::from_millis(500), 3)
}

/// Determines if a storage failure is worth another transaction.
///
/// Retryable:
/// - transient transport and commit failures
///
/// Non-retryable:
/// - `Busy`: the backend already waited its lock timeout
/// - missing rows and undecodable columns
pub fn is_retryable_storage(err: &StorageError) -> bool {
    err.is_transient()
}

//! Batched, retrying commit of canonical rows to the remote table.

use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::RetryPolicy;
use crate::model::CanonicalRow;
use crate::store::{StoreRecord, TableClient};

/// Largest exponent used for backoff; later retries wait as long as this one.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Outcome of one [`commit_all`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub batch_count: usize,
    pub total_inserted: usize,
    /// 1-based indices of batches that exhausted their retries, in commit order.
    pub failed_batches: Vec<usize>,
}

impl CommitReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Delay before retry number `attempt` (1 for the first retry).
pub fn retry_backoff(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXPONENT))
}

/// Commits `rows` to `table` in consecutive batches of `policy.batch_size`.
///
/// Each batch gets one attempt plus up to `policy.max_retries` retries,
/// waiting [`retry_backoff`] before each retry. A batch that still fails is
/// recorded and skipped; later batches are attempted regardless.
#[tracing::instrument(skip(client, rows), fields(rows = rows.len(), batch_size = policy.batch_size))]
pub async fn commit_all<C: TableClient + ?Sized>(
    client: &C,
    table: &str,
    rows: &[CanonicalRow],
    policy: &RetryPolicy,
) -> CommitReport {
    let mut report = CommitReport::default();

    for (i, chunk) in rows.chunks(policy.batch_size.max(1)).enumerate() {
        let batch_index = i + 1;
        report.batch_count += 1;

        let records: Vec<StoreRecord> = chunk.iter().map(StoreRecord::from).collect();

        let mut attempt = 0u32;
        loop {
            match client.insert(table, &records).await {
                Ok(()) => {
                    report.total_inserted += records.len();
                    info!(batch = batch_index, rows = records.len(), "Inserted batch");
                    break;
                }
                Err(e) => {
                    attempt += 1;
                    warn!(batch = batch_index, attempt, error = %e, "Batch insert failed");

                    if attempt > policy.max_retries {
                        error!(
                            batch = batch_index,
                            retries = policy.max_retries,
                            "Giving up on batch"
                        );
                        report.failed_batches.push(batch_index);
                        break;
                    }

                    tokio::time::sleep(retry_backoff(policy.backoff_unit, attempt)).await;
                }
            }
        }
    }

    info!(
        inserted = report.total_inserted,
        batches = report.batch_count,
        failed = ?report.failed_batches,
        "Commit finished"
    );
    report
}

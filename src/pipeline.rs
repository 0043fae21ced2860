//! Stage composition: transform, load, analyze.
//!
//! Stages run strictly one after another. A stage returning `Err` is fatal
//! and stops the run; recoverable problems are carried in the stage reports.

use anyhow::Result;
use std::time::Instant;
use tracing::{info, warn};

use crate::analyzers::analyzer::{AnalyzeOutcome, analyze};
use crate::analyzers::writetos3::publish_reports;
use crate::config::Config;
use crate::load::{CommitReport, commit_all};
use crate::output::{read_staged, write_staged};
use crate::store::TableClient;
use crate::transform::{TransformReport, flatten, load_snapshots};

/// Reports of every stage that ran.
#[derive(Debug, Default)]
pub struct RunReport {
    pub transform: Option<TransformReport>,
    pub commit: Option<CommitReport>,
    pub analyze: Option<AnalyzeOutcome>,
}

/// Flattens the raw directory and writes the staged CSV.
#[tracing::instrument(skip_all, fields(raw_dir = %config.raw_dir.display()))]
pub fn run_transform(config: &Config) -> Result<TransformReport> {
    let start = Instant::now();

    let (snapshots, skipped) = load_snapshots(&config.raw_dir)?;
    let (rows, mut report) = flatten(&snapshots);
    report.documents_read += skipped.len();
    report.skipped = skipped;

    write_staged(&config.staged_csv, &rows)?;

    info!(
        rows = report.rows,
        skipped_documents = report.skipped.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Transform stage finished"
    );
    Ok(report)
}

/// Reads the staged CSV and commits it to the store table.
#[tracing::instrument(skip_all, fields(staged = %config.staged_csv.display()))]
pub async fn run_load<C: TableClient + ?Sized>(config: &Config, client: &C) -> Result<CommitReport> {
    let start = Instant::now();
    let store = config.require_store()?;

    let staged = read_staged(&config.staged_csv)?;
    if staged.skipped > 0 {
        warn!(skipped = staged.skipped, "Staged records skipped");
    }

    let report = commit_all(client, &store.table, &staged.rows, &config.retry).await;

    if !report.is_complete() {
        warn!(failed_batches = ?report.failed_batches, "Some batches were not committed");
    }
    info!(
        total_inserted = report.total_inserted,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Load stage finished"
    );
    Ok(report)
}

/// Aggregates the committed table, writes reports and publishes them if configured.
#[tracing::instrument(skip_all, fields(processed_dir = %config.processed_dir.display()))]
pub async fn run_analyze<C: TableClient + ?Sized>(
    config: &Config,
    client: &C,
    s3: Option<&aws_sdk_s3::Client>,
) -> Result<AnalyzeOutcome> {
    let start = Instant::now();
    let store = config.require_store()?;

    let outcome = analyze(client, &store.table, &config.processed_dir).await?;

    match (&config.publish, s3) {
        (Some(publish), Some(s3)) if !outcome.report_paths.is_empty() => {
            publish_reports(s3, publish, &outcome.report_paths).await?;
        }
        (Some(_), None) => warn!("S3 bucket configured without a client; skipping upload"),
        _ => {}
    }

    info!(
        reports = outcome.report_paths.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Analyze stage finished"
    );
    Ok(outcome)
}

/// Runs transform, load and analyze in order, stopping at the first fatal error.
pub async fn run_all<C: TableClient + ?Sized>(
    config: &Config,
    client: &C,
    s3: Option<&aws_sdk_s3::Client>,
) -> Result<RunReport> {
    config.require_store()?;

    let mut report = RunReport {
        transform: Some(run_transform(config)?),
        ..Default::default()
    };
    report.commit = Some(run_load(config, client).await?);
    report.analyze = Some(run_analyze(config, client, s3).await?);

    info!("Pipeline finished");
    Ok(report)
}

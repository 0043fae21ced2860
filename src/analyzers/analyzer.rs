use crate::analyzers::aggregate::aggregate_rows;
use crate::analyzers::report::write_reports;
use crate::analyzers::types::{Analysis, StoredRow};
use crate::store::TableClient;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of one analysis pass.
#[derive(Debug)]
pub struct AnalyzeOutcome {
    pub analysis: Option<Analysis>,
    pub dropped_rows: usize,
    pub report_paths: Vec<PathBuf>,
}

/// Reads the whole table and keeps the rows the aggregations can use.
///
/// Returns the usable rows and how many were dropped for a missing city or
/// an unparseable time.
pub async fn load_committed_rows<C: TableClient + ?Sized>(
    client: &C,
    table: &str,
) -> Result<(Vec<StoredRow>, usize)> {
    let values = client
        .select_all(table)
        .await
        .with_context(|| format!("reading table {table}"))?;

    let total = values.len();
    let rows: Vec<StoredRow> = values.iter().filter_map(StoredRow::from_value).collect();
    let dropped = total - rows.len();
    if dropped > 0 {
        warn!(dropped, "Dropped stored rows without city or valid time");
    }

    Ok((rows, dropped))
}

/// Aggregates the committed table and writes the reports into `out_dir`.
///
/// An empty table produces no reports.
#[tracing::instrument(skip(client, out_dir), fields(out_dir = %out_dir.display()))]
pub async fn analyze<C: TableClient + ?Sized>(
    client: &C,
    table: &str,
    out_dir: &Path,
) -> Result<AnalyzeOutcome> {
    let (rows, dropped_rows) = load_committed_rows(client, table).await?;

    if rows.is_empty() {
        warn!(table, "No rows fetched from table; nothing to analyze");
        return Ok(AnalyzeOutcome {
            analysis: None,
            dropped_rows,
            report_paths: Vec::new(),
        });
    }

    let analysis = aggregate_rows(&rows);
    let report_paths = write_reports(out_dir, &analysis)?;

    let summary = analysis.summary();
    info!(
        rows = summary.row_count(),
        city_highest_pm2_5 = ?summary.city_highest_pm2_5(),
        city_highest_severity = ?summary.city_highest_severity(),
        worst_hour_aqi = ?summary.worst_hour_aqi(),
        risk_distribution = ?summary.risk_distribution(),
        "Analysis complete"
    );

    Ok(AnalyzeOutcome {
        analysis: Some(analysis),
        dropped_rows,
        report_paths,
    })
}

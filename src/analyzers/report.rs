//! CSV and JSON artifacts written after aggregation.

use anyhow::{Context, Result};
use csv::Writer;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analyzers::types::{Analysis, CityRiskTable, SummaryRecord, TrendRow};

pub const SUMMARY_CSV: &str = "summary_metrics.csv";
pub const TRENDS_CSV: &str = "pollution_trends.csv";
pub const CITY_RISK_CSV: &str = "city_risk_distribution.csv";
pub const SUMMARY_JSON: &str = "summary.json";

/// Writes all report files into `dir` and returns their paths.
pub fn write_reports(dir: &Path, analysis: &Analysis) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let summary_path = dir.join(SUMMARY_CSV);
    write_summary_csv(&summary_path, &analysis.summary)?;

    let trends_path = dir.join(TRENDS_CSV);
    write_trends_csv(&trends_path, &analysis.trends)?;

    let risk_path = dir.join(CITY_RISK_CSV);
    write_city_risk_csv(&risk_path, &analysis.city_risk)?;

    let json_path = dir.join(SUMMARY_JSON);
    fs::write(&json_path, serde_json::to_vec_pretty(&analysis.summary)?)
        .with_context(|| format!("writing {}", json_path.display()))?;

    info!(dir = %dir.display(), "Reports written");
    Ok(vec![summary_path, trends_path, risk_path, json_path])
}

/// One-line summary table with a `risk_pct_<flag>` column per flag.
fn write_summary_csv(path: &Path, summary: &SummaryRecord) -> Result<()> {
    let mut writer = Writer::from_path(path)?;

    let mut header = vec![
        "city_highest_pm2_5".to_string(),
        "city_highest_severity".to_string(),
        "worst_hour_aqi".to_string(),
    ];
    header.extend(
        summary
            .risk_distribution
            .keys()
            .map(|flag| format!("risk_pct_{flag}")),
    );
    writer.write_record(&header)?;

    let mut record = vec![
        summary.city_highest_pm2_5.clone().unwrap_or_default(),
        summary.city_highest_severity.clone().unwrap_or_default(),
        summary
            .worst_hour_aqi
            .map(|h| h.to_string())
            .unwrap_or_default(),
    ];
    record.extend(summary.risk_distribution.values().map(|pct| format!("{pct:.2}")));
    writer.write_record(&record)?;

    writer.flush()?;
    Ok(())
}

fn write_trends_csv(path: &Path, trends: &[TrendRow]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for row in trends {
        writer.serialize(row)?;
    }
    if trends.is_empty() {
        writer.write_record(["city", "time", "pm2_5", "pm10", "ozone"])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_city_risk_csv(path: &Path, table: &CityRiskTable) -> Result<()> {
    let mut writer = Writer::from_path(path)?;

    let mut header = vec!["city".to_string()];
    header.extend(table.flags.iter().cloned());
    writer.write_record(&header)?;

    for (city, counts) in &table.counts {
        let mut record = vec![city.clone()];
        record.extend(counts.iter().map(|c| c.to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

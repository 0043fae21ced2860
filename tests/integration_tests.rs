use air_quality_etl::config::Config;
use air_quality_etl::pipeline::{run_all, run_analyze, run_load, run_transform};
use air_quality_etl::store::{StoreRecord, TableClient};
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const FIXTURES: &[(&str, &str)] = &[
    (
        "new_delhi_raw_20240501.json",
        include_str!("fixtures/new_delhi_raw_20240501.json"),
    ),
    (
        "pune_raw_20240501.json",
        include_str!("fixtures/pune_raw_20240501.json"),
    ),
    (
        "agra_raw_20240501.json",
        include_str!("fixtures/agra_raw_20240501.json"),
    ),
];

/// Append-only table kept in memory. Insert calls listed in `failing_calls` fail.
#[derive(Default)]
struct MemoryTable {
    rows: Mutex<Vec<Value>>,
    calls: Mutex<usize>,
    failing_calls: Vec<usize>,
}

#[async_trait]
impl TableClient for MemoryTable {
    async fn select_all(&self, _table: &str) -> Result<Vec<Value>> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn insert(&self, _table: &str, records: &[StoreRecord]) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.failing_calls.contains(&call) {
            bail!("503 Service Unavailable");
        }
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            rows.push(serde_json::to_value(record)?);
        }
        Ok(())
    }
}

fn workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("air_quality_etl_it_{name}"));
    let _ = fs::remove_dir_all(&dir);
    let raw = dir.join("raw");
    fs::create_dir_all(&raw).unwrap();
    for (file, body) in FIXTURES {
        fs::write(raw.join(file), body).unwrap();
    }
    dir
}

fn config(dir: &Path, extra: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = HashMap::from([
        ("RAW_DIR".into(), dir.join("raw").display().to_string()),
        (
            "STAGED_CSV".into(),
            dir.join("staged/air_quality_transformed.csv").display().to_string(),
        ),
        ("PROCESSED_DIR".into(), dir.join("processed").display().to_string()),
        ("SUPABASE_URL".into(), "https://example.supabase.co".into()),
        ("SUPABASE_KEY".into(), "test-key".into()),
        ("LOAD_BACKOFF_MS".into(), "0".into()),
    ]);
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|name| env.get(name).cloned()).unwrap()
}

#[tokio::test]
async fn test_full_pipeline() {
    let dir = workspace("full");
    let cfg = config(&dir, &[]);
    let table = MemoryTable::default();

    let report = run_all(&cfg, &table, None).await.expect("pipeline should succeed");

    let transform = report.transform.unwrap();
    assert_eq!(transform.documents_read, 3);
    assert_eq!(transform.skipped.len(), 1);
    assert_eq!(transform.dropped_bad_time, 1);
    assert_eq!(transform.dropped_all_null, 1);
    assert_eq!(transform.rows, 5);

    let commit = report.commit.unwrap();
    assert_eq!(commit.total_inserted, 5);
    assert!(commit.failed_batches.is_empty());

    let outcome = report.analyze.unwrap();
    let analysis = outcome.analysis.unwrap();
    let summary = analysis.summary();
    assert_eq!(summary.row_count(), 5);
    assert_eq!(summary.city_highest_pm2_5(), Some("New Delhi"));
    assert_eq!(summary.city_highest_severity(), Some("New Delhi"));
    assert_eq!(summary.worst_hour_aqi(), Some(1));
    assert_eq!(summary.risk_distribution()["High Risk"], 60.0);
    assert_eq!(summary.risk_distribution()["Moderate Risk"], 40.0);

    assert_eq!(analysis.trends().len(), 5);
    assert_eq!(analysis.city_risk().count("Pune", "High Risk"), Some(0));
    assert_eq!(analysis.city_risk().count("New Delhi", "High Risk"), Some(3));

    let processed = dir.join("processed");
    for file in [
        "summary_metrics.csv",
        "pollution_trends.csv",
        "city_risk_distribution.csv",
        "summary.json",
    ] {
        assert!(processed.join(file).exists(), "missing {file}");
    }

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_committed_rows_use_store_columns() {
    let dir = workspace("columns");
    let cfg = config(&dir, &[]);
    let table = MemoryTable::default();

    run_transform(&cfg).unwrap();
    run_load(&cfg, &table).await.unwrap();

    let rows = table.rows.lock().unwrap();
    let first = &rows[0];
    assert_eq!(first["city"], "New Delhi");
    assert_eq!(first["time"], "2024-05-01T00:00:00");
    assert_eq!(first["risk_flag"], "High Risk");
    assert_eq!(first["aqi_category"], "Moderate");
    assert!(first.get("severity_score").is_some());
    assert!(first.get("AQI").is_none());

    let pune_second = rows.iter().find(|r| r["city"] == "Pune" && r["hour"] == 1).unwrap();
    assert_eq!(pune_second["pm2_5"], 14.5);
    assert!(pune_second["carbon_monoxide"].is_null());
    drop(rows);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_load() {
    let dir = workspace("failed_batch");
    let cfg = config(&dir, &[("BATCH_SIZE", "2"), ("LOAD_MAX_RETRIES", "1")]);
    // batches: [1] call 1 ok, [2] calls 2 and 3 fail, [3] call 4 ok
    let table = MemoryTable {
        failing_calls: vec![2, 3],
        ..Default::default()
    };

    run_transform(&cfg).unwrap();
    let commit = run_load(&cfg, &table).await.unwrap();

    assert_eq!(commit.batch_count, 3);
    assert_eq!(commit.total_inserted, 3);
    assert_eq!(commit.failed_batches, vec![2]);
    assert_eq!(table.rows.lock().unwrap().len(), 3);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_load_without_staged_file_is_fatal() {
    let dir = workspace("no_staged");
    let cfg = config(&dir, &[]);
    let table = MemoryTable::default();

    assert!(run_load(&cfg, &table).await.is_err());

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_missing_credentials_abort_before_any_stage() {
    let dir = workspace("no_credentials");
    let mut cfg = config(&dir, &[]);
    cfg.store = None;
    let table = MemoryTable::default();

    assert!(run_all(&cfg, &table, None).await.is_err());
    assert!(!cfg.staged_csv.exists());

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_analyze_empty_table_writes_nothing() {
    let dir = workspace("empty_table");
    let cfg = config(&dir, &[]);
    let table = MemoryTable::default();

    let outcome = run_analyze(&cfg, &table, None).await.unwrap();

    assert!(outcome.analysis.is_none());
    assert!(outcome.report_paths.is_empty());
    assert!(!dir.join("processed").exists());

    fs::remove_dir_all(&dir).unwrap();
}

//! Staged CSV persistence between the transform and load steps.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::model::CanonicalRow;

/// Column layout of the staged file.
pub const STAGED_HEADER: [&str; 13] = [
    "city",
    "time",
    "pm10",
    "pm2_5",
    "carbon_monoxide",
    "nitrogen_dioxide",
    "sulphur_dioxide",
    "ozone",
    "uv_index",
    "AQI",
    "severity",
    "risk",
    "hour",
];

/// Writes `rows` to `path`, replacing any previous staged file.
///
/// Parent directories are created as needed. Missing readings are written
/// as empty fields.
pub fn write_staged(path: &Path, rows: &[CanonicalRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating staged directory {}", parent.display()))?;
    }

    let file =
        File::create(path).with_context(|| format!("creating staged file {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    if rows.is_empty() {
        writer.write_record(STAGED_HEADER)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Staged rows written");
    Ok(())
}

/// Rows read back from a staged file plus the number of records skipped.
#[derive(Debug, Default)]
pub struct StagedRows {
    pub rows: Vec<CanonicalRow>,
    pub skipped: usize,
}

/// Reads a staged file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its header is unreadable.
/// Individual records that fail to deserialize (for example an unparseable
/// `time`) are logged and skipped.
pub fn read_staged(path: &Path) -> Result<StagedRows> {
    let file =
        File::open(path).with_context(|| format!("opening staged file {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?;

    let mut staged = StagedRows::default();
    for (i, result) in reader.deserialize::<CanonicalRow>().enumerate() {
        match result {
            Ok(row) => staged.rows.push(row),
            Err(e) => {
                warn!(record = i + 1, error = %e, "Skipping malformed staged record");
                staged.skipped += 1;
            }
        }
    }

    debug!(path = %path.display(), rows = staged.rows.len(), skipped = staged.skipped, "Staged rows read");
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AqiCategory, PollutantReadings, RiskFlag};
    use crate::transform::{RawSnapshot, flatten};
    use chrono::NaiveDate;
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn row(city: &str, hour: u32, pm2_5: Option<f64>) -> CanonicalRow {
        let time = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        CanonicalRow::new(
            city,
            time,
            PollutantReadings {
                pm2_5,
                ozone: Some(41.3),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_staged_header() {
        let path = temp_path("air_quality_etl_test_header.csv");
        let _ = fs::remove_file(&path);

        write_staged(&path, &[row("Delhi", 0, Some(12.0))]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(
            header,
            "city,time,pm10,pm2_5,carbon_monoxide,nitrogen_dioxide,sulphur_dioxide,ozone,uv_index,AQI,severity,risk,hour"
        );
        assert_eq!(header, STAGED_HEADER.join(","));
        assert!(content.contains("Delhi,2024-05-01T00:00:00,,12.0,"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_staged_file_keeps_header() {
        let path = temp_path("air_quality_etl_test_empty.csv");
        let _ = fs::remove_file(&path);

        write_staged(&path, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), STAGED_HEADER.join(","));
        let staged = read_staged(&path).unwrap();
        assert!(staged.rows.is_empty());
        assert_eq!(staged.skipped, 0);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_staged_round_trip() {
        let path = temp_path("air_quality_etl_test_round_trip.csv");
        let _ = fs::remove_file(&path);

        let doc = serde_json::json!({"hourly": {
            "time": ["2024-05-01T03:00", "2024-05-01T04:00", "2024-05-01T05:00"],
            "pm2_5": [250.7, null, "0.1"],
            "pm10": [310.2, 42.0],
            "ozone": [41.3, 40.9, 38.0],
            "uv_index": [0.0, 0.35, 1.2]
        }});
        let snap = RawSnapshot::from_json("New Delhi", &doc.to_string()).unwrap();
        let (rows, _) = flatten(&[snap]);
        assert_eq!(rows.len(), 3);

        write_staged(&path, &rows).unwrap();
        let staged = read_staged(&path).unwrap();

        assert_eq!(staged.skipped, 0);
        assert_eq!(staged.rows, rows);
        assert_eq!(staged.rows[0].aqi_category, Some(AqiCategory::VeryUnhealthy));
        assert_eq!(staged.rows[0].risk_flag, RiskFlag::High);
        assert_eq!(staged.rows[1].aqi_category, None);
        assert_eq!(staged.rows[2].pm10, None);
        assert_eq!(staged.rows[2].pm2_5, Some(0.1));
        assert_eq!(staged.rows[2].hour, 5);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_staged_tolerates_bad_records() {
        let path = temp_path("air_quality_etl_test_bad_records.csv");
        fs::write(
            &path,
            "city,time,pm10,pm2_5,carbon_monoxide,nitrogen_dioxide,sulphur_dioxide,ozone,uv_index,AQI,severity,risk,hour\n\
             Delhi,2024-05-01 01:00:00,abc,10,,,,,,Good,50.0,Low Risk,1\n\
             Delhi,garbage,1,10,,,,,,Good,50.0,Low Risk,1\n",
        )
        .unwrap();

        let staged = read_staged(&path).unwrap();
        assert_eq!(staged.skipped, 1);
        assert_eq!(staged.rows.len(), 1);
        assert_eq!(staged.rows[0].pm10, None);
        assert_eq!(staged.rows[0].pm2_5, Some(10.0));
        assert_eq!(staged.rows[0].risk_flag, RiskFlag::Low);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_staged_missing_file_is_error() {
        let path = temp_path("air_quality_etl_test_missing.csv");
        let _ = fs::remove_file(&path);
        assert!(read_staged(&path).is_err());
    }
}

//! Data types used by the aggregation step.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{hour_timestamp, parse_timestamp};
use crate::transform::coerce_f64;

/// A committed row as read back from the store.
///
/// Only the columns the aggregations use are kept. Numeric columns are
/// coerced leniently, so a malformed value nulls the field, not the row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub(crate) city: String,
    pub(crate) time: NaiveDateTime,
    pub(crate) pm2_5: Option<f64>,
    pub(crate) pm10: Option<f64>,
    pub(crate) ozone: Option<f64>,
    pub(crate) severity_score: Option<f64>,
    pub(crate) risk_flag: Option<String>,
}

impl StoredRow {
    /// Returns `None` when the row has no city or no parseable `time`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let city = value.get("city")?.as_str()?.to_string();
        let time = parse_timestamp(value.get("time")?.as_str()?)?;
        let number = |key: &str| value.get(key).and_then(coerce_f64);

        Some(StoredRow {
            city,
            time,
            pm2_5: number("pm2_5"),
            pm10: number("pm10"),
            ozone: number("ozone"),
            severity_score: number("severity_score"),
            risk_flag: value
                .get("risk_flag")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Per-city means over non-null values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityMeans {
    pub(crate) city: String,
    pub(crate) rows: usize,
    pub(crate) mean_pm2_5: Option<f64>,
    pub(crate) mean_severity: Option<f64>,
}

/// Headline metrics for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub(crate) generated_at: DateTime<Utc>,
    pub(crate) row_count: usize,
    pub(crate) city_highest_pm2_5: Option<String>,
    pub(crate) city_highest_severity: Option<String>,
    pub(crate) worst_hour_aqi: Option<u32>,
    /// Percentage of flagged rows per risk flag, rounded to 2 decimals.
    pub(crate) risk_distribution: BTreeMap<String, f64>,
    pub(crate) cities: Vec<CityMeans>,
}

/// One line of the pollution trend report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub(crate) city: String,
    #[serde(with = "hour_timestamp")]
    pub(crate) time: NaiveDateTime,
    pub(crate) pm2_5: Option<f64>,
    pub(crate) pm10: Option<f64>,
    pub(crate) ozone: Option<f64>,
}

/// City × risk flag row counts. Every city has a count for every flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CityRiskTable {
    pub(crate) flags: Vec<String>,
    pub(crate) counts: BTreeMap<String, Vec<usize>>,
}

impl CityRiskTable {
    pub fn count(&self, city: &str, flag: &str) -> Option<usize> {
        let column = self.flags.iter().position(|f| f == flag)?;
        self.counts.get(city).map(|row| row[column])
    }
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub(crate) summary: SummaryRecord,
    pub(crate) trends: Vec<TrendRow>,
    pub(crate) city_risk: CityRiskTable,
}

impl Analysis {
    pub fn summary(&self) -> &SummaryRecord {
        &self.summary
    }

    pub fn trends(&self) -> &[TrendRow] {
        &self.trends
    }

    pub fn city_risk(&self) -> &CityRiskTable {
        &self.city_risk
    }
}

impl SummaryRecord {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn city_highest_pm2_5(&self) -> Option<&str> {
        self.city_highest_pm2_5.as_deref()
    }

    pub fn city_highest_severity(&self) -> Option<&str> {
        self.city_highest_severity.as_deref()
    }

    pub fn worst_hour_aqi(&self) -> Option<u32> {
        self.worst_hour_aqi
    }

    pub fn risk_distribution(&self) -> &BTreeMap<String, f64> {
        &self.risk_distribution
    }
}

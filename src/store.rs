//! Seam between the pipeline and the remote table.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::model::{AqiCategory, CanonicalRow, RiskFlag};

/// Row access to a remote append-only table.
///
/// Implementations own transport and credentials; callers only name the table.
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Returns every row of `table`, as loosely-typed JSON objects.
    async fn select_all(&self, table: &str) -> Result<Vec<Value>>;

    /// Appends `records` to `table` in a single request.
    async fn insert(&self, table: &str, records: &[StoreRecord]) -> Result<()>;
}

/// A [`CanonicalRow`] in the column layout of the remote table.
///
/// Missing readings serialize as JSON `null`; `time` is ISO-8601 without offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreRecord {
    pub city: String,
    pub time: String,
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
    pub uv_index: Option<f64>,
    pub aqi_category: Option<AqiCategory>,
    pub severity_score: f64,
    pub risk_flag: RiskFlag,
    pub hour: u32,
}

impl From<&CanonicalRow> for StoreRecord {
    fn from(row: &CanonicalRow) -> Self {
        StoreRecord {
            city: row.city.clone(),
            time: row.time_iso(),
            pm10: row.pm10,
            pm2_5: row.pm2_5,
            carbon_monoxide: row.carbon_monoxide,
            nitrogen_dioxide: row.nitrogen_dioxide,
            sulphur_dioxide: row.sulphur_dioxide,
            ozone: row.ozone,
            uv_index: row.uv_index,
            aqi_category: row.aqi_category,
            severity_score: row.severity_score,
            risk_flag: row.risk_flag,
            hour: row.hour,
        }
    }
}

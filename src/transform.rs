//! Flattens per-city hourly documents into [`CanonicalRow`]s.
//!
//! Documents follow the Open-Meteo air-quality layout: an `hourly` object
//! holding a `time` array and one array per pollutant, aligned by index.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::model::{CanonicalRow, Pollutant, PollutantReadings, parse_timestamp};

const RAW_MARKER: &str = "_raw_";

/// One city's hourly time series, as read from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    pub city: String,
    pub time: Vec<Value>,
    pub series: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    hourly: Option<Hourly>,
}

#[derive(Deserialize)]
struct Hourly {
    #[serde(default)]
    time: Vec<Value>,
    #[serde(flatten)]
    series: HashMap<String, Value>,
}

impl RawSnapshot {
    /// Parses a document body. Fails if it is not JSON or `hourly` has the wrong shape.
    pub fn from_json(city: impl Into<String>, body: &str) -> Result<Self> {
        let doc: Document = serde_json::from_str(body)?;
        let (time, series) = match doc.hourly {
            Some(h) => (h.time, h.series),
            None => (Vec::new(), HashMap::new()),
        };
        Ok(Self {
            city: city.into(),
            time,
            series,
        })
    }

    /// Reading of `pollutant` at `index`, or `None` when absent or non-numeric.
    pub fn reading(&self, pollutant: Pollutant, index: usize) -> Option<f64> {
        self.series
            .get(pollutant.key())
            .and_then(Value::as_array)
            .and_then(|values| values.get(index))
            .and_then(coerce_f64)
    }
}

/// A document that could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Counters for one transform run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransformReport {
    pub documents_read: usize,
    pub skipped: Vec<SkippedDocument>,
    pub dropped_bad_time: usize,
    pub dropped_all_null: usize,
    pub rows: usize,
}

/// Lenient numeric coercion: numbers and numeric strings parse, everything else is `None`.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Derives a display city name from a `<city>_raw_<suffix>.json` file name.
///
/// `new_delhi_raw_20240501.json` becomes `New Delhi`.
pub fn city_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (prefix, _) = stem.split_once(RAW_MARKER)?;
    Some(title_case(&prefix.replace('_', " ")))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start_of_word = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}

fn is_raw_document(path: &Path) -> bool {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    is_json && name.contains(RAW_MARKER)
}

/// Reads every raw document in `dir`, in path order.
///
/// An unreadable directory is an error; individual bad documents are
/// skipped and returned alongside the parsed snapshots.
#[tracing::instrument(skip(dir), fields(dir = %dir.display()))]
pub fn load_snapshots(dir: &Path) -> Result<(Vec<RawSnapshot>, Vec<SkippedDocument>)> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_raw_document(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut snapshots = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        let Some(city) = city_from_path(&path) else {
            continue;
        };

        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|body| RawSnapshot::from_json(city, &body));

        match parsed {
            Ok(snapshot) => {
                debug!(path = %path.display(), city = %snapshot.city, hours = snapshot.time.len(), "Document parsed");
                snapshots.push(snapshot);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping invalid document");
                skipped.push(SkippedDocument {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok((snapshots, skipped))
}

/// Builds one row per time-axis entry of each snapshot.
///
/// Rows keep snapshot order and, within a snapshot, time-axis order. Rows
/// with an unparseable time and rows with no pollutant reading at all are
/// dropped and counted in the returned report.
pub fn flatten(snapshots: &[RawSnapshot]) -> (Vec<CanonicalRow>, TransformReport) {
    let mut report = TransformReport {
        documents_read: snapshots.len(),
        ..Default::default()
    };
    let mut rows = Vec::new();

    for snapshot in snapshots {
        if snapshot.time.is_empty() {
            debug!(city = %snapshot.city, "Snapshot has no time axis");
            continue;
        }

        for (i, raw_time) in snapshot.time.iter().enumerate() {
            let Some(time) = raw_time.as_str().and_then(parse_timestamp) else {
                report.dropped_bad_time += 1;
                continue;
            };

            let mut readings = PollutantReadings::default();
            for pollutant in Pollutant::ALL {
                readings.set(pollutant, snapshot.reading(pollutant, i));
            }

            if readings.all_missing() {
                report.dropped_all_null += 1;
                continue;
            }

            rows.push(CanonicalRow::new(snapshot.city.clone(), time, readings));
        }
    }

    report.rows = rows.len();
    if report.dropped_bad_time > 0 {
        warn!(rows = report.dropped_bad_time, "Dropped rows with unparseable time");
    }
    info!(
        documents = report.documents_read,
        rows = report.rows,
        all_null = report.dropped_all_null,
        "Flattened snapshots"
    );

    (rows, report)
}

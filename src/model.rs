//! Canonical row schema shared by the transform, load and staging steps.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::{classify_risk, compute_aqi_category, compute_severity};

/// Format used for timestamps in the staged CSV and in store payloads.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Pollutant readings tracked per (city, hour), in staged column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pollutant {
    Pm10,
    Pm2_5,
    CarbonMonoxide,
    NitrogenDioxide,
    SulphurDioxide,
    Ozone,
    UvIndex,
}

impl Pollutant {
    pub const ALL: [Pollutant; 7] = [
        Pollutant::Pm10,
        Pollutant::Pm2_5,
        Pollutant::CarbonMonoxide,
        Pollutant::NitrogenDioxide,
        Pollutant::SulphurDioxide,
        Pollutant::Ozone,
        Pollutant::UvIndex,
    ];

    /// Key used both in raw `hourly` documents and in the row schema.
    pub fn key(self) -> &'static str {
        match self {
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm2_5 => "pm2_5",
            Pollutant::CarbonMonoxide => "carbon_monoxide",
            Pollutant::NitrogenDioxide => "nitrogen_dioxide",
            Pollutant::SulphurDioxide => "sulphur_dioxide",
            Pollutant::Ozone => "ozone",
            Pollutant::UvIndex => "uv_index",
        }
    }
}

/// AQI band derived from PM2.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse three-level classification of the severity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskFlag {
    #[serde(rename = "High Risk")]
    High,
    #[serde(rename = "Moderate Risk")]
    Moderate,
    #[serde(rename = "Low Risk")]
    Low,
}

impl RiskFlag {
    pub fn label(self) -> &'static str {
        match self {
            RiskFlag::High => "High Risk",
            RiskFlag::Moderate => "Moderate Risk",
            RiskFlag::Low => "Low Risk",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The pollutant part of a row. `None` means no reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PollutantReadings {
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
    pub uv_index: Option<f64>,
}

impl PollutantReadings {
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm10 => self.pm10,
            Pollutant::Pm2_5 => self.pm2_5,
            Pollutant::CarbonMonoxide => self.carbon_monoxide,
            Pollutant::NitrogenDioxide => self.nitrogen_dioxide,
            Pollutant::SulphurDioxide => self.sulphur_dioxide,
            Pollutant::Ozone => self.ozone,
            Pollutant::UvIndex => self.uv_index,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        let slot = match pollutant {
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::Pm2_5 => &mut self.pm2_5,
            Pollutant::CarbonMonoxide => &mut self.carbon_monoxide,
            Pollutant::NitrogenDioxide => &mut self.nitrogen_dioxide,
            Pollutant::SulphurDioxide => &mut self.sulphur_dioxide,
            Pollutant::Ozone => &mut self.ozone,
            Pollutant::UvIndex => &mut self.uv_index,
        };
        *slot = value;
    }

    pub fn all_missing(&self) -> bool {
        Pollutant::ALL.iter().all(|p| self.get(*p).is_none())
    }
}

/// One flattened (city, hour) observation with derived features.
///
/// Serializes to the staged CSV layout; the derived columns keep their
/// staged names (`AQI`, `severity`, `risk`). See [`crate::store::StoreRecord`]
/// for the store-side names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub city: String,
    #[serde(with = "hour_timestamp")]
    pub time: NaiveDateTime,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub pm10: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub pm2_5: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub carbon_monoxide: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub nitrogen_dioxide: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub sulphur_dioxide: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub ozone: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub uv_index: Option<f64>,
    #[serde(rename = "AQI", deserialize_with = "csv::invalid_option")]
    pub aqi_category: Option<AqiCategory>,
    #[serde(rename = "severity")]
    pub severity_score: f64,
    #[serde(rename = "risk")]
    pub risk_flag: RiskFlag,
    pub hour: u32,
}

impl CanonicalRow {
    /// Builds a row and attaches the derived AQI, severity, risk and hour.
    pub fn new(city: impl Into<String>, time: NaiveDateTime, readings: PollutantReadings) -> Self {
        let severity_score = compute_severity(&readings);
        CanonicalRow {
            city: city.into(),
            time,
            pm10: readings.pm10,
            pm2_5: readings.pm2_5,
            carbon_monoxide: readings.carbon_monoxide,
            nitrogen_dioxide: readings.nitrogen_dioxide,
            sulphur_dioxide: readings.sulphur_dioxide,
            ozone: readings.ozone,
            uv_index: readings.uv_index,
            aqi_category: compute_aqi_category(readings.pm2_5),
            severity_score,
            risk_flag: classify_risk(severity_score),
            hour: time.hour(),
        }
    }

    pub fn readings(&self) -> PollutantReadings {
        PollutantReadings {
            pm10: self.pm10,
            pm2_5: self.pm2_5,
            carbon_monoxide: self.carbon_monoxide,
            nitrogen_dioxide: self.nitrogen_dioxide,
            sulphur_dioxide: self.sulphur_dioxide,
            ozone: self.ozone,
            uv_index: self.uv_index,
        }
    }

    /// Canonical ISO-8601 rendering of `time`.
    pub fn time_iso(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }
}

/// Parses the timestamp forms seen in raw documents, staged files and store rows.
///
/// Offset-carrying values are normalized to UTC. Returns `None` when nothing matches.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(t);
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc).naive_utc())
}

/// Serde adapter writing [`TIME_FORMAT`] and reading anything [`parse_timestamp`] accepts.
pub mod hour_timestamp {
    use super::{TIME_FORMAT, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("unparseable time '{raw}'")))
    }
}

//! Derived risk indicators computed from pollutant readings.

use crate::model::{AqiCategory, PollutantReadings, RiskFlag};

/// Maps PM2.5 onto an AQI band.
///
/// | PM2.5        | Category       |
/// |--------------|----------------|
/// | <= 50        | Good           |
/// | <= 100       | Moderate       |
/// | <= 200       | Unhealthy      |
/// | <= 300       | Very Unhealthy |
/// | > 300        | Hazardous      |
pub fn compute_aqi_category(pm2_5: Option<f64>) -> Option<AqiCategory> {
    let p = pm2_5.filter(|p| !p.is_nan())?;
    Some(match p {
        p if p <= 50.0 => AqiCategory::Good,
        p if p <= 100.0 => AqiCategory::Moderate,
        p if p <= 200.0 => AqiCategory::Unhealthy,
        p if p <= 300.0 => AqiCategory::VeryUnhealthy,
        _ => AqiCategory::Hazardous,
    })
}

/// Weighted linear sum of the pollutants. A missing reading contributes zero.
pub fn compute_severity(r: &PollutantReadings) -> f64 {
    let v = |value: Option<f64>| value.unwrap_or(0.0);
    5.0 * v(r.pm2_5)
        + 3.0 * v(r.pm10)
        + 4.0 * v(r.nitrogen_dioxide)
        + 4.0 * v(r.sulphur_dioxide)
        + 2.0 * v(r.carbon_monoxide)
        + 3.0 * v(r.ozone)
}

/// Classifies a severity score. Boundary values fall into the lower bucket.
pub fn classify_risk(severity: f64) -> RiskFlag {
    match severity {
        s if s > 400.0 => RiskFlag::High,
        s if s > 200.0 => RiskFlag::Moderate,
        _ => RiskFlag::Low,
    }
}

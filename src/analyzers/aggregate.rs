use crate::analyzers::types::{
    Analysis, CityMeans, CityRiskTable, StoredRow, SummaryRecord, TrendRow,
};
use crate::analyzers::utility::{argmax, group_means, round_to};
use chrono::{Timelike, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Computes the summary, trend and city × risk tables over all committed rows.
///
/// Each computation ignores rows whose input field is null; no row is
/// excluded from the others because of it.
pub fn aggregate_rows(rows: &[StoredRow]) -> Analysis {
    let city_pm25 = group_means(rows.iter().map(|r| (r.city.as_str(), r.pm2_5)));
    let city_severity = group_means(rows.iter().map(|r| (r.city.as_str(), r.severity_score)));
    let hourly_pm25 = group_means(rows.iter().map(|r| (r.time.hour(), r.pm2_5)));

    let mut row_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *row_counts.entry(row.city.as_str()).or_default() += 1;
    }

    let cities = row_counts
        .iter()
        .map(|(city, count)| CityMeans {
            city: city.to_string(),
            rows: *count,
            mean_pm2_5: city_pm25.get(city).copied(),
            mean_severity: city_severity.get(city).copied(),
        })
        .collect();

    let summary = SummaryRecord {
        generated_at: Utc::now(),
        row_count: rows.len(),
        city_highest_pm2_5: argmax(&city_pm25).map(str::to_string),
        city_highest_severity: argmax(&city_severity).map(str::to_string),
        worst_hour_aqi: argmax(&hourly_pm25),
        risk_distribution: risk_distribution(rows),
        cities,
    };

    Analysis {
        summary,
        trends: trend_rows(rows),
        city_risk: city_risk_table(rows),
    }
}

/// Share of each risk flag among rows that carry one, in percent (2 decimals).
pub fn risk_distribution(rows: &[StoredRow]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for flag in rows.iter().filter_map(|r| r.risk_flag.as_deref()) {
        *counts.entry(flag).or_default() += 1;
    }

    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(flag, count)| {
            let pct = round_to(count as f64 / total as f64 * 100.0, 2);
            (flag.to_string(), pct)
        })
        .collect()
}

/// Per (city, time) PM2.5, PM10 and ozone, sorted by city then time.
pub fn trend_rows(rows: &[StoredRow]) -> Vec<TrendRow> {
    let mut trends: Vec<TrendRow> = rows
        .iter()
        .map(|r| TrendRow {
            city: r.city.clone(),
            time: r.time,
            pm2_5: r.pm2_5,
            pm10: r.pm10,
            ozone: r.ozone,
        })
        .collect();
    trends.sort_by(|a, b| a.city.cmp(&b.city).then(a.time.cmp(&b.time)));
    trends
}

/// Row counts per city and risk flag; absent combinations are zero.
pub fn city_risk_table(rows: &[StoredRow]) -> CityRiskTable {
    let flags: Vec<String> = rows
        .iter()
        .filter_map(|r| r.risk_flag.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut counts: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for row in rows {
        let Some(flag) = row.risk_flag.as_deref() else {
            continue;
        };
        let Some(column) = flags.iter().position(|f| f == flag) else {
            continue;
        };
        counts
            .entry(row.city.clone())
            .or_insert_with(|| vec![0; flags.len()])[column] += 1;
    }

    CityRiskTable { flags, counts }
}

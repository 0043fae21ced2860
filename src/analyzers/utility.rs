use std::collections::BTreeMap;

/// Arithmetic mean of `values`. Returns `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Rounds to `places` decimal places, half away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Key with the largest value. Ties go to the first key in order.
pub fn argmax<K: Clone>(values: &BTreeMap<K, f64>) -> Option<K> {
    let mut best: Option<(&K, f64)> = None;
    for (key, value) in values {
        match best {
            Some((_, current)) if *value <= current => {}
            _ => best = Some((key, *value)),
        }
    }
    best.map(|(key, _)| key.clone())
}

/// Groups `(key, value)` pairs, keeping only present values, and averages each group.
///
/// Groups with no present value are left out.
pub fn group_means<K, I>(pairs: I) -> BTreeMap<K, f64>
where
    K: Ord,
    I: IntoIterator<Item = (K, Option<f64>)>,
{
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (key, value) in pairs {
        if let Some(v) = value {
            groups.entry(key).or_default().push(v);
        }
    }
    groups
        .into_iter()
        .filter_map(|(key, values)| mean(&values).map(|m| (key, m)))
        .collect()
}

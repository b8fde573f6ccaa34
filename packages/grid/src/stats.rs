//! Per-cell, per-property running statistics.

use std::collections::BTreeMap;

use market_map_layer_models::{Feature, PropertyValue};
use serde::Serialize;

/// Sum, count, and raw values of one numeric property within one cell.
///
/// `count` always equals `values.len()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyStats {
    /// Sum of all recorded values.
    pub sum: f64,
    /// Recorded values in insertion order.
    pub values: Vec<f64>,
    /// Number of recorded values.
    pub count: usize,
}

impl PropertyStats {
    /// Records one value.
    pub fn record(&mut self, value: f64) {
        self.sum += value;
        self.values.push(value);
        self.count += 1;
    }

    /// `sum / count`, or `None` when nothing was recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Middle of the sorted values; the mean of the two middle values when
    /// the count is even.
    #[must_use]
    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        Some(if sorted.len() % 2 == 0 {
            sorted[mid - 1].midpoint(sorted[mid])
        } else {
            sorted[mid]
        })
    }
}

/// Collects statistics for every numeric-coercible property across
/// `features`.
///
/// Null values and strings that do not parse as numbers are skipped, so a
/// property only counts the features that actually carry a number for it.
#[must_use]
pub fn collect_stats(features: &[&Feature]) -> BTreeMap<String, PropertyStats> {
    let mut stats: BTreeMap<String, PropertyStats> = BTreeMap::new();

    for feature in features {
        for (key, value) in &feature.properties {
            if let Some(n) = value.as_number() {
                stats.entry(key.clone()).or_default().record(n);
            } else if !matches!(value, PropertyValue::Null) {
                log::trace!("Skipping non-numeric value for '{key}'");
            }
        }
    }

    stats
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Heatmap density normalization.
//!
//! Every point gets a raw weight (the layer's weight property, or `1`),
//! then the weights are min-max rescaled into
//! `[0, MAX_NORMALIZED_DENSITY]` and written to a new `density` property.
//! When every weight is the same there is nothing to rescale and every
//! point gets a density of `1`.

use std::collections::HashSet;

use market_map_layer_models::{Feature, PropertyValue};
use serde::Serialize;

/// Upper end of the normalized density range.
pub const MAX_NORMALIZED_DENSITY: f64 = 5.0;

/// Density assigned to every feature when all raw weights are equal, and
/// the raw weight of a feature without a usable weight value.
pub const UNIFORM_DENSITY: f64 = 1.0;

/// Name of the property the normalized density is written to.
pub const DENSITY_PROPERTY: &str = "density";

/// A closed numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensityRange {
    /// Lower end, inclusive.
    pub min: f64,
    /// Upper end, inclusive.
    pub max: f64,
}

impl DensityRange {
    const ZERO: Self = Self { min: 0.0, max: 0.0 };
}

/// Diagnostics describing one normalization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapStats {
    /// Smallest and largest raw weight.
    pub original_range: DensityRange,
    /// Range of the written densities.
    pub normalized_range: DensityRange,
    /// Number of features normalized.
    pub feature_count: usize,
    /// Number of distinct raw weights.
    pub unique_values: usize,
    /// Arithmetic mean of the raw weights.
    pub mean: f64,
}

/// Normalized features plus the stats of the run that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapResult {
    /// Copies of the input features, each with `density` set.
    pub features: Vec<Feature>,
    /// Stats of the run.
    pub stats: HeatmapStats,
}

/// Raw heatmap weight of a single feature.
///
/// Without a weight property, or when the feature does not carry it, the
/// weight is [`UNIFORM_DENSITY`]. A value that does not parse as a finite
/// number is logged and also falls back to [`UNIFORM_DENSITY`].
#[must_use]
pub fn raw_density(feature: &Feature, weight_property: Option<&str>) -> f64 {
    let Some(key) = weight_property.map(str::trim).filter(|k| !k.is_empty()) else {
        return UNIFORM_DENSITY;
    };

    match feature.property(key) {
        None | Some(PropertyValue::Null) => UNIFORM_DENSITY,
        Some(value) => value.as_number().unwrap_or_else(|| {
            log::warn!(
                "Feature {:?}: cannot parse '{key}' value {value:?} as a number; using {UNIFORM_DENSITY}",
                feature.id
            );
            UNIFORM_DENSITY
        }),
    }
}

/// Computes raw weights for `features` and normalizes them.
#[must_use]
pub fn normalize(features: &[Feature], weight_property: Option<&str>) -> HeatmapResult {
    let raw: Vec<f64> = features
        .iter()
        .map(|f| raw_density(f, weight_property))
        .collect();
    normalize_with_densities(features, &raw)
}

/// Normalizes precomputed raw weights, one per feature in `features`.
///
/// Lets callers compute [`raw_density`] in parallel and normalize once all
/// weights are known. Extra entries on either side are ignored.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn normalize_with_densities(features: &[Feature], raw: &[f64]) -> HeatmapResult {
    debug_assert_eq!(features.len(), raw.len());
    let count = features.len().min(raw.len());
    let raw = &raw[..count];

    if count == 0 {
        return HeatmapResult {
            features: Vec::new(),
            stats: HeatmapStats {
                original_range: DensityRange::ZERO,
                normalized_range: DensityRange::ZERO,
                feature_count: 0,
                unique_values: 0,
                mean: 0.0,
            },
        };
    }

    let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    // Halving is exact, so rescaling the halves gives the same result when
    // `max - min` itself overflows.
    let scale = |d: f64| {
        if range <= 0.0 {
            UNIFORM_DENSITY
        } else if range.is_finite() {
            (d - min) / range * MAX_NORMALIZED_DENSITY
        } else {
            let (d, min, max) = (d / 2.0, min / 2.0, max / 2.0);
            ((d - min) / (max - min) * MAX_NORMALIZED_DENSITY).clamp(0.0, MAX_NORMALIZED_DENSITY)
        }
    };

    let normalized: Vec<Feature> = features
        .iter()
        .zip(raw)
        .map(|(feature, &d)| feature.with_property(DENSITY_PROPERTY, scale(d)))
        .collect();

    let normalized_range = if range <= 0.0 {
        DensityRange {
            min: UNIFORM_DENSITY,
            max: UNIFORM_DENSITY,
        }
    } else {
        DensityRange {
            min: 0.0,
            max: MAX_NORMALIZED_DENSITY,
        }
    };

    // `+ 0.0` folds -0.0 into 0.0 so they count as one value.
    let unique_values = raw
        .iter()
        .map(|d| (d + 0.0).to_bits())
        .collect::<HashSet<_>>()
        .len();

    let stats = HeatmapStats {
        original_range: DensityRange { min, max },
        normalized_range,
        feature_count: count,
        unique_values,
        mean: raw.iter().map(|d| d / count as f64).sum(),
    };

    log::debug!(
        "Normalized {count} heatmap weights from [{min}, {max}] ({unique_values} unique)"
    );

    HeatmapResult {
        features: normalized,
        stats,
    }
}

/// Declarative paint for a heatmap layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapPaint {
    /// Interpolation from `density` to a `[0, 1]` weight.
    #[serde(rename = "heatmap-weight")]
    pub heatmap_weight: serde_json::Value,
    /// Fixed color ramp over the rendered heatmap density.
    #[serde(rename = "heatmap-color")]
    pub heatmap_color: serde_json::Value,
}

impl Default for HeatmapPaint {
    fn default() -> Self {
        Self {
            heatmap_weight: serde_json::json!([
                "interpolate",
                ["linear"],
                ["get", DENSITY_PROPERTY],
                0,
                0,
                MAX_NORMALIZED_DENSITY,
                1
            ]),
            heatmap_color: serde_json::json!([
                "interpolate",
                ["linear"],
                ["heatmap-density"],
                0,
                "rgba(33, 102, 172, 0)",
                0.2,
                "rgb(103, 169, 207)",
                0.4,
                "rgb(209, 229, 240)",
                0.6,
                "rgb(253, 219, 199)",
                0.8,
                "rgb(239, 138, 98)",
                1,
                "rgb(178, 24, 43)"
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use market_map_layer_models::{LngLat, Properties};

    use super::*;

    fn weighted(value: impl Into<PropertyValue>) -> Feature {
        let mut properties = Properties::new();
        properties.insert("visits".to_string(), value.into());
        Feature::new(LngLat::new(46.7, 24.7), properties)
    }

    fn densities(result: &HeatmapResult) -> Vec<f64> {
        result
            .features
            .iter()
            .map(|f| f.property(DENSITY_PROPERTY).unwrap().as_number().unwrap())
            .collect()
    }

    #[test]
    fn uniform_weights_become_one() {
        let features: Vec<Feature> = (0..4).map(|_| weighted(1.0)).collect();
        let result = normalize(&features, Some("visits"));

        assert_eq!(densities(&result), vec![1.0; 4]);
        assert_eq!(
            result.stats.original_range,
            DensityRange { min: 1.0, max: 1.0 }
        );
        assert_eq!(result.stats.unique_values, 1);
        assert_eq!(result.stats.feature_count, 4);
    }

    #[test]
    fn two_weights_span_the_full_range() {
        let features = vec![weighted(0.0), weighted(10.0)];
        let result = normalize(&features, Some("visits"));

        assert_eq!(densities(&result), vec![0.0, 5.0]);
        assert!((result.stats.mean - 5.0).abs() < f64::EPSILON);
        assert_eq!(
            result.stats.normalized_range,
            DensityRange { min: 0.0, max: 5.0 }
        );
    }

    #[test]
    fn normalized_densities_stay_in_range() {
        let features: Vec<Feature> = [3.5, -2.0, 17.25, 0.0, 8.0, 17.25]
            .into_iter()
            .map(weighted)
            .collect();
        let out = densities(&normalize(&features, Some("visits")));

        assert!(out.iter().all(|d| (0.0..=MAX_NORMALIZED_DENSITY).contains(d)));
        assert!(out.contains(&0.0));
        assert!(out.contains(&MAX_NORMALIZED_DENSITY));
    }

    #[test]
    fn extreme_weights_stay_in_range() {
        let features = vec![weighted(1.5e308), weighted(-1.5e308), weighted(0.0)];
        let result = normalize(&features, Some("visits"));
        let out = densities(&result);

        assert!(out.iter().all(|d| d.is_finite()));
        assert!(out.iter().all(|d| (0.0..=MAX_NORMALIZED_DENSITY).contains(d)));
        assert!((out[0] - MAX_NORMALIZED_DENSITY).abs() < f64::EPSILON);
        assert!(out[1].abs() < f64::EPSILON);
        assert!((out[2] - 2.5).abs() < 1e-9);
        assert!(result.stats.mean.is_finite());
    }

    #[test]
    fn huge_weights_keep_a_finite_mean() {
        let features = vec![weighted(f64::MAX), weighted(f64::MAX)];
        let result = normalize(&features, Some("visits"));

        assert!((result.stats.mean - f64::MAX).abs() <= f64::MAX * f64::EPSILON);
        assert_eq!(densities(&result), vec![UNIFORM_DENSITY; 2]);
    }

    #[test]
    fn unparsable_weights_fall_back_to_one() {
        assert!((raw_density(&weighted("n/a"), Some("visits")) - 1.0).abs() < f64::EPSILON);
        assert!((raw_density(&weighted(" 7 "), Some("visits")) - 7.0).abs() < f64::EPSILON);
        assert!((raw_density(&weighted(PropertyValue::Null), Some("visits")) - 1.0).abs() < f64::EPSILON);
        assert!((raw_density(&weighted(9.0), Some("other")) - 1.0).abs() < f64::EPSILON);
        assert!((raw_density(&weighted(9.0), None) - 1.0).abs() < f64::EPSILON);
        assert!((raw_density(&weighted(9.0), Some("  ")) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn inputs_are_left_untouched() {
        let features = vec![weighted(2.0), weighted(4.0)];
        let result = normalize(&features, Some("visits"));
        assert!(features[0].property(DENSITY_PROPERTY).is_none());
        assert_eq!(result.features[0].property("visits"), features[0].property("visits"));
    }

    #[test]
    fn empty_input_reports_zero_stats() {
        let result = normalize(&[], Some("visits"));
        assert!(result.features.is_empty());
        assert_eq!(result.stats.feature_count, 0);
        assert_eq!(result.stats.original_range, DensityRange::ZERO);
        assert!(result.stats.mean.abs() < f64::EPSILON);
    }

    #[test]
    fn paint_reads_density() {
        let paint = serde_json::to_value(HeatmapPaint::default()).unwrap();
        assert_eq!(paint["heatmap-weight"][2][1], DENSITY_PROPERTY);
        assert_eq!(paint["heatmap-weight"][5], MAX_NORMALIZED_DENSITY);
        assert_eq!(paint["heatmap-color"][2][0], "heatmap-density");
    }
}

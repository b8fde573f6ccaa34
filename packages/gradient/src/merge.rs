//! Gradient response parsing and merging.

use market_map_gradient_models::GradientGroup;
use market_map_layer_models::{Feature, Layer};
use serde_json::Value;

use crate::GradientError;

/// Per-feature property holding the color of the feature's bucket.
pub const GRADIENT_COLOR_PROPERTY: &str = "gradient_color";

/// Per-feature property holding the legend of the feature's bucket.
pub const GRADIENT_LEGEND_PROPERTY: &str = "gradient_legend";

/// Parses a gradient service response into groups.
///
/// The body is either a bare array of groups or an object with a `data`
/// array. Every group must carry a `points_color` and a `features` array;
/// individual features that are not finite points are skipped with a
/// warning. A missing `records_count` falls back to the number of parsed
/// features.
///
/// # Errors
///
/// Returns [`GradientError::MalformedResponse`] if there are no groups or
/// any group is malformed.
pub fn parse_groups(body: Value) -> Result<Vec<GradientGroup>, GradientError> {
    let entries = match body {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(GradientError::MalformedResponse {
                    message: "response object has no 'data' array".to_string(),
                });
            }
        },
        Value::Null => {
            return Err(GradientError::MalformedResponse {
                message: "response is empty".to_string(),
            });
        }
        other => {
            return Err(GradientError::MalformedResponse {
                message: format!("expected an array of groups, got {other}"),
            });
        }
    };

    if entries.is_empty() {
        return Err(GradientError::MalformedResponse {
            message: "response contains no groups".to_string(),
        });
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| parse_group(i, entry))
        .collect()
}

fn parse_group(index: usize, entry: Value) -> Result<GradientGroup, GradientError> {
    let Value::Object(mut group) = entry else {
        return Err(GradientError::MalformedResponse {
            message: format!("group {index} is not an object"),
        });
    };

    let Some(Value::Array(raw_features)) = group.remove("features") else {
        return Err(GradientError::MalformedResponse {
            message: format!("group {index} has no 'features' array"),
        });
    };

    let Some(Value::String(points_color)) = group.remove("points_color") else {
        return Err(GradientError::MalformedResponse {
            message: format!("group {index} has no 'points_color'"),
        });
    };

    let layer_legend = match group.remove("layer_legend") {
        Some(Value::String(legend)) => legend,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let features: Vec<Feature> = raw_features
        .into_iter()
        .enumerate()
        .filter_map(|(j, raw)| {
            let parsed = serde_json::from_value::<geojson::Feature>(raw)
                .map_err(|e| e.to_string())
                .and_then(|f| Feature::try_from(f).map_err(|e| e.to_string()));
            match parsed {
                Ok(feature) => Some(feature),
                Err(e) => {
                    log::warn!("Skipping feature {j} of gradient group {index}: {e}");
                    None
                }
            }
        })
        .collect();

    let records_count = group
        .get("records_count")
        .and_then(Value::as_u64)
        .unwrap_or(features.len() as u64);

    Ok(GradientGroup {
        points_color,
        layer_legend,
        records_count,
        features,
    })
}

/// Builds the recolored version of `layer` from `groups`.
///
/// The result's features are every group's features in group order, each
/// tagged with its group's color and legend. They replace the layer's
/// features outright, so merging the same groups again yields the same
/// layer. `layer` itself is not modified.
#[must_use]
pub fn merge_gradient_groups(layer: &Layer, based_on_lyr_id: &str, groups: &[GradientGroup]) -> Layer {
    let features: Vec<Feature> = groups
        .iter()
        .flat_map(|group| {
            group.features.iter().map(|feature| {
                let mut tagged = feature.clone();
                tagged.properties.insert(
                    GRADIENT_COLOR_PROPERTY.to_string(),
                    group.points_color.as_str().into(),
                );
                tagged.properties.insert(
                    GRADIENT_LEGEND_PROPERTY.to_string(),
                    group.layer_legend.as_str().into(),
                );
                tagged
            })
        })
        .collect();

    log::debug!(
        "Merged {} gradient groups into {} features for layer {}",
        groups.len(),
        features.len(),
        layer.id
    );

    Layer {
        features,
        gradient_groups: groups.iter().map(GradientGroup::summary).collect(),
        is_gradient: true,
        gradient_based_on: Some(based_on_lyr_id.to_string()),
        ..layer.clone()
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request and result types for gradient zone recoloring.
//!
//! A [`GradientRequest`] asks the gradient service to bucket every feature
//! of the change layer by how it compares against a based-on layer within
//! some coverage (a radius or a drive time). The service answers with one
//! [`GradientGroup`] per palette bucket.

use market_map_layer_models::{Feature, GradientGroupSummary};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// How coverage around each based-on feature is measured.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoverageProperty {
    /// Straight-line distance, `coverage_value` in meters.
    Radius,
    /// Driving time, `coverage_value` in minutes.
    DriveTime,
}

/// Parameters of one gradient recoloring request.
///
/// Identifier and metric fields default to empty when absent so that a
/// request missing them deserializes and is then rejected by validation
/// with a descriptive message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientRequest {
    /// Layer whose features get recolored.
    #[serde(default)]
    pub change_lyr_id: String,
    #[serde(default)]
    pub change_lyr_name: String,
    /// Layer the change layer is compared against.
    #[serde(default)]
    pub based_on_lyr_id: String,
    #[serde(default)]
    pub based_on_lyr_name: String,
    pub coverage_property: CoverageProperty,
    /// Meters for [`CoverageProperty::Radius`], minutes for
    /// [`CoverageProperty::DriveTime`].
    pub coverage_value: f64,
    /// Metric that decides which bucket a feature falls into.
    #[serde(default)]
    pub color_based_on: String,
    /// Hex colors from low to high.
    #[serde(default)]
    pub color_grid_choice: Vec<String>,
}

/// One bucket of a gradient result.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientGroup {
    /// Color assigned to every feature of the bucket.
    pub points_color: String,
    /// Legend label of the bucket.
    pub layer_legend: String,
    /// Number of records the service put in the bucket.
    pub records_count: u64,
    pub features: Vec<Feature>,
}

impl GradientGroup {
    /// Legend entry for this bucket.
    #[must_use]
    pub fn summary(&self) -> GradientGroupSummary {
        GradientGroupSummary {
            color: self.points_color.clone(),
            legend: self.layer_legend.clone(),
            count: self.records_count,
        }
    }
}

//! Grid paint planning.
//!
//! Opacity breakpoints are linear fractions of the largest cell density
//! (`p25 = 0.25 * max`, ...), not quantiles of the density distribution.

use serde::Serialize;

use crate::GridCell;

/// Outline color drawn around every grid cell.
pub const GRID_OUTLINE_COLOR: &str = "rgba(0, 0, 0, 0.1)";

/// Opacity for cells with some density below `p25`.
pub const BASE_OPACITY: f64 = 0.1;

/// Density breakpoints for the grid's opacity steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityThresholds {
    /// A quarter of `max_density`.
    pub p25: f64,
    /// Half of `max_density`.
    pub p50: f64,
    /// Three quarters of `max_density`.
    pub p75: f64,
    /// Largest cell density, floored at `1`.
    pub max_density: f64,
}

/// Computes the breakpoints for `cells`.
///
/// Unaggregated cells and non-finite densities are ignored. The maximum is
/// floored at `1` so an all-zero grid still gets strictly ascending steps.
#[must_use]
pub fn plan(cells: &[GridCell]) -> DensityThresholds {
    let max_density = cells
        .iter()
        .filter_map(|c| c.summary.as_ref().map(|s| s.density))
        .filter(|d| d.is_finite())
        .fold(1.0, f64::max);

    DensityThresholds {
        p25: 0.25 * max_density,
        p50: 0.5 * max_density,
        p75: 0.75 * max_density,
        max_density,
    }
}

/// Declarative fill paint for a grid layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridPaint {
    /// Fill color of every cell.
    #[serde(rename = "fill-color")]
    pub fill_color: String,
    /// Step expression over `density`.
    #[serde(rename = "fill-opacity")]
    pub fill_opacity: serde_json::Value,
    /// Cell outline color.
    #[serde(rename = "fill-outline-color")]
    pub fill_outline_color: String,
}

impl GridPaint {
    /// Builds the paint for `thresholds`, filling cells with `fill_color`.
    ///
    /// Empty cells are transparent; occupied cells step through
    /// `0.1 / 0.25 / 0.5 / 0.75` opacity at `p25`, `p50`, and `p75`.
    #[must_use]
    pub fn new(thresholds: &DensityThresholds, fill_color: &str) -> Self {
        let fill_opacity = serde_json::json!([
            "case",
            ["==", ["get", "density"], 0],
            0,
            [
                "step",
                ["get", "density"],
                BASE_OPACITY,
                thresholds.p25,
                0.25,
                thresholds.p50,
                0.5,
                thresholds.p75,
                0.75
            ]
        ]);

        Self {
            fill_color: fill_color.to_string(),
            fill_opacity,
            fill_outline_color: GRID_OUTLINE_COLOR.to_string(),
        }
    }
}

/// Opacity a renderer would compute for `density` under `thresholds`.
///
/// Mirrors the expression built by [`GridPaint::new`].
#[must_use]
pub fn opacity_for(density: f64, thresholds: &DensityThresholds) -> f64 {
    if density <= 0.0 {
        0.0
    } else if density >= thresholds.p75 {
        0.75
    } else if density >= thresholds.p50 {
        0.5
    } else if density >= thresholds.p25 {
        0.25
    } else {
        BASE_OPACITY
    }
}

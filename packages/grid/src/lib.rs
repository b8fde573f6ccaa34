#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Grid-based spatial aggregation.
//!
//! The grid pipeline runs in three steps:
//!
//! 1. [`builder`] lays a uniform square grid over the layer's bounds (city
//!    borders when known, otherwise the buffered feature extent).
//! 2. [`aggregate`] finds the points inside each cell through the
//!    [`SpatialIndex`](market_map_spatial::SpatialIndex) and attaches a
//!    density, point count, and per-property sums.
//! 3. [`paint`] derives opacity breakpoints from the cell densities.
//!
//! Every step produces new [`GridCell`] values; input cells and features
//! are never modified.

pub mod aggregate;
pub mod builder;
pub mod paint;
pub mod stats;

use std::collections::BTreeMap;

use geo::{Centroid, Rect, coord};
use geojson::{Geometry, JsonObject, Value};
use market_map_layer_models::convert::properties_to_json;
use market_map_layer_models::{BoundingBox, LngLat, Properties};
use thiserror::Error;

pub use aggregate::{aggregate, aggregate_cell};
pub use builder::GridBuilder;
pub use paint::{DensityThresholds, GridPaint};
pub use stats::PropertyStats;

/// Errors from grid construction.
#[derive(Debug, Error)]
pub enum GridError {
    /// The requested cell side is zero, negative, or not a number.
    #[error("Invalid grid size {meters} m: must be a positive, finite number")]
    InvalidCellSize {
        /// The rejected cell side in meters.
        meters: f64,
    },

    /// The bounds cannot be gridded.
    #[error("Invalid grid bounds: {message}")]
    InvalidBounds {
        /// Description of what is wrong with the bounds.
        message: String,
    },

    /// The grid would exceed the cell limit.
    #[error("Grid of {columns}x{rows} cells exceeds the limit of {limit} cells")]
    TooManyCells {
        /// Number of columns requested.
        columns: usize,
        /// Number of rows requested.
        rows: usize,
        /// Maximum cells allowed.
        limit: usize,
    },
}

/// Aggregates attached to a cell once its points have been counted.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSummary {
    /// Centroid of the cell.
    pub center: LngLat,
    /// Styling scalar: weighted sum, or point count when unweighted.
    pub density: f64,
    /// Number of points inside the cell.
    pub point_count: usize,
    /// Per-property statistics over the contained points.
    pub stats: BTreeMap<String, PropertyStats>,
}

/// One square polygon of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    /// Position in generation order. Not stable across regenerations.
    pub id: usize,
    /// Cell extent.
    pub bounds: BoundingBox,
    /// Template properties plus, after aggregation, rounded per-property sums.
    pub properties: Properties,
    /// Present once the cell has been aggregated.
    pub summary: Option<CellSummary>,
}

impl GridCell {
    /// The closed polygon of this cell.
    #[must_use]
    pub fn polygon(&self) -> geo::Polygon<f64> {
        Rect::new(
            coord! { x: self.bounds.west, y: self.bounds.south },
            coord! { x: self.bounds.east, y: self.bounds.north },
        )
        .to_polygon()
    }

    /// Centroid of the cell, or `None` when it is not a finite pair.
    #[must_use]
    pub fn center(&self) -> Option<LngLat> {
        if !self.bounds.is_valid() {
            return None;
        }
        let point = self.polygon().centroid()?;
        let center = LngLat::new(point.x(), point.y());
        center.is_finite().then_some(center)
    }

    /// Half-open membership test: west and south edges belong to the
    /// cell, east and north edges belong to the neighbour.
    #[must_use]
    pub fn owns(&self, point: LngLat) -> bool {
        point.lng >= self.bounds.west
            && point.lng < self.bounds.east
            && point.lat >= self.bounds.south
            && point.lat < self.bounds.north
    }

    /// Density of an aggregated cell; `0` before aggregation.
    #[must_use]
    pub fn density(&self) -> f64 {
        self.summary.as_ref().map_or(0.0, |s| s.density)
    }

    /// Point count of an aggregated cell; `0` before aggregation.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.summary.as_ref().map_or(0, |s| s.point_count)
    }

    /// Renders the cell as a `GeoJSON` polygon feature.
    ///
    /// Aggregated cells carry `density`, `pointCount`, and `center`
    /// alongside their summed properties.
    #[must_use]
    pub fn to_geojson_feature(&self) -> geojson::Feature {
        let ring: Vec<Vec<f64>> = self
            .polygon()
            .exterior()
            .coords()
            .map(|c| vec![c.x, c.y])
            .collect();

        let mut properties: JsonObject = properties_to_json(&self.properties);
        if let Some(summary) = &self.summary {
            properties.insert("density".to_string(), serde_json::json!(summary.density));
            properties.insert(
                "pointCount".to_string(),
                serde_json::json!(summary.point_count),
            );
            properties.insert(
                "center".to_string(),
                serde_json::json!({ "lng": summary.center.lng, "lat": summary.center.lat }),
            );
        }

        geojson::Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
            id: Some(geojson::feature::Id::Number(self.id.into())),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Wraps cells into a `GeoJSON` `FeatureCollection`.
#[must_use]
pub fn cells_to_feature_collection(cells: &[GridCell]) -> geojson::FeatureCollection {
    geojson::FeatureCollection {
        bbox: None,
        features: cells.iter().map(GridCell::to_geojson_feature).collect(),
        foreign_members: None,
    }
}

/// Rounds to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

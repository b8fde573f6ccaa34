#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Layer and feature types for the market map analytics pipelines.
//!
//! A [`Layer`] is an ordered list of point [`Feature`]s plus the layer-level
//! metadata the dataset API attaches (`basedon`, `points_color`, display
//! mode flags, city, bounds). Feature properties are an open-ended
//! [`Properties`] bag since the set of numeric columns is only known at
//! runtime.
//!
//! The pipelines never mutate input features in place; they produce new
//! features and cells from these types.

pub mod convert;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default circle color for layers that arrive without one.
pub const DEFAULT_POINTS_COLOR: &str = "#28A745";

/// Errors from parsing layer data.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The payload is not valid `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The payload parsed, but is not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection, got {kind}")]
    NotAFeatureCollection {
        /// The top-level `GeoJSON` object that was found instead.
        kind: String,
    },

    /// A feature's geometry is missing, not a point, or not finite.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of what is wrong with the geometry.
        message: String,
    },
}

/// A single value in a feature's property bag.
///
/// Booleans, arrays, and objects from the source payload are kept as their
/// JSON text in [`PropertyValue::String`] so they never count as numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A JSON number.
    Number(f64),
    /// A JSON string (possibly holding a number, e.g. `"12.5"`).
    String(String),
    /// JSON `null` or an absent value.
    Null,
}

impl PropertyValue {
    /// Coerces the value to a finite number.
    ///
    /// Numeric strings are accepted after trimming. Empty strings, `null`,
    /// and anything that parses to a non-finite value yield `None`.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Self::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            Self::Null => None,
        }
    }

    /// Returns `true` for [`PropertyValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Bool(b) => Self::String(b.to_string()),
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::String(other.to_string())
            }
        }
    }
}

impl From<&PropertyValue> for serde_json::Value {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Number(n) => {
                serde_json::Number::from_f64(*n).map_or(Self::Null, Self::Number)
            }
            PropertyValue::String(s) => Self::String(s.clone()),
            PropertyValue::Null => Self::Null,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

/// A feature's property bag, ordered by key.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    /// Longitude in degrees.
    pub lng: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl LngLat {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Returns `true` when both components are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

/// A geographic bounding box in WGS84 coordinates.
///
/// Serialized as `[west, south, east, north]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Computes the tightest box around `points`, ignoring non-finite ones.
    ///
    /// Returns `None` when no finite point is supplied.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = LngLat>) -> Option<Self> {
        points
            .into_iter()
            .filter(LngLat::is_finite)
            .fold(None, |acc: Option<Self>, p| {
                Some(acc.map_or_else(
                    || Self::new(p.lng, p.lat, p.lng, p.lat),
                    |b| {
                        Self::new(
                            b.west.min(p.lng),
                            b.south.min(p.lat),
                            b.east.max(p.lng),
                            b.north.max(p.lat),
                        )
                    },
                ))
            })
    }

    /// Grows the box by `degrees` on every side.
    #[must_use]
    pub fn expand(&self, degrees: f64) -> Self {
        Self::new(
            self.west - degrees,
            self.south - degrees,
            self.east + degrees,
            self.north + degrees,
        )
    }

    /// Width in degrees of longitude.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Returns `true` when all edges are finite and the box is not inverted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.west <= self.east
            && self.south <= self.north
    }

    /// Inclusive containment test on all four edges.
    #[must_use]
    pub fn contains(&self, point: LngLat) -> bool {
        point.lng >= self.west
            && point.lng <= self.east
            && point.lat >= self.south
            && point.lat <= self.north
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> LngLat {
        LngLat::new(
            self.west.midpoint(self.east),
            self.south.midpoint(self.north),
        )
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([west, south, east, north]: [f64; 4]) -> Self {
        Self::new(west, south, east, north)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.west, b.south, b.east, b.north]
    }
}

/// A point feature with a flat property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Optional `GeoJSON` feature id, carried through untouched.
    pub id: Option<geojson::feature::Id>,
    /// Point position.
    pub coordinates: LngLat,
    /// Property bag.
    pub properties: Properties,
}

impl Feature {
    /// Creates a point feature without an id.
    #[must_use]
    pub const fn new(coordinates: LngLat, properties: Properties) -> Self {
        Self {
            id: None,
            coordinates,
            properties,
        }
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Returns a copy of this feature with `key` set to `value`.
    #[must_use]
    pub fn with_property(&self, key: &str, value: impl Into<PropertyValue>) -> Self {
        let mut properties = self.properties.clone();
        properties.insert(key.to_string(), value.into());
        Self {
            id: self.id.clone(),
            coordinates: self.coordinates,
            properties,
        }
    }
}

/// Stable identifier assigned to a layer when it is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(Uuid);

impl LayerId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Legend entry for one bucket of a gradient-recolored layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradientGroupSummary {
    /// Hex color of the bucket.
    pub color: String,
    /// Legend label of the bucket.
    pub legend: String,
    /// Number of records the backend reported for the bucket.
    pub count: u64,
}

/// A city's registered bounding borders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityBorders {
    /// City name as the dataset API spells it.
    pub name: String,
    /// Corner coordinates.
    pub borders: Borders,
}

/// Northeast and southwest corners of a city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Borders {
    /// North-east corner.
    pub northeast: LngLat,
    /// South-west corner.
    pub southwest: LngLat,
}

impl CityBorders {
    /// Converts the corners into a [`BoundingBox`].
    #[must_use]
    pub const fn to_bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.borders.southwest.lng,
            self.borders.southwest.lat,
            self.borders.northeast.lng,
            self.borders.northeast.lat,
        )
    }
}

/// A layer: point features plus the metadata the renderer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Stable identity, assigned at creation.
    pub id: LayerId,
    /// Producer layer id from the dataset API.
    pub prdcer_lyr_id: Option<String>,
    /// Backend dataset id from the dataset API.
    pub bknd_dataset_id: Option<String>,
    /// Token for fetching the next page, if any.
    pub next_page_token: Option<String>,
    /// Display name / legend label.
    pub layer_legend: Option<String>,
    /// Numeric property that weights density; empty means point count.
    pub basedon: String,
    /// Base point color.
    pub points_color: String,
    /// Rendered as a heatmap.
    pub is_heatmap: bool,
    /// Rendered as an aggregation grid.
    pub is_grid: bool,
    /// Recolored by a gradient comparison.
    pub is_gradient: bool,
    /// City the dataset belongs to, used to look up borders.
    pub city_name: Option<String>,
    /// Explicit bounds, if the API supplied them.
    pub bounds: Option<BoundingBox>,
    /// Legend entries after a gradient merge.
    pub gradient_groups: Vec<GradientGroupSummary>,
    /// Based-on layer id of the last gradient merge.
    pub gradient_based_on: Option<String>,
    /// Point features.
    pub features: Vec<Feature>,
}

impl Layer {
    /// Creates a plain points layer with a fresh [`LayerId`].
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            id: LayerId::generate(),
            prdcer_lyr_id: None,
            bknd_dataset_id: None,
            next_page_token: None,
            layer_legend: None,
            basedon: String::new(),
            points_color: DEFAULT_POINTS_COLOR.to_string(),
            is_heatmap: false,
            is_grid: false,
            is_gradient: false,
            city_name: None,
            bounds: None,
            gradient_groups: Vec::new(),
            gradient_based_on: None,
            features,
        }
    }

    /// The density weight property, or `None` when density is a point count.
    #[must_use]
    pub fn weight_property(&self) -> Option<&str> {
        let trimmed = self.basedon.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Appends the features of a subsequent page of the same dataset.
    ///
    /// The layer keeps its identity and display settings; only the feature
    /// list grows and the page cursor advances. Metadata the first page
    /// lacked is filled in from `page`.
    pub fn extend_page(&mut self, page: Self) {
        self.features.extend(page.features);
        self.next_page_token = page.next_page_token;
        if self.bknd_dataset_id.is_none() {
            self.bknd_dataset_id = page.bknd_dataset_id;
        }
        if self.city_name.is_none() {
            self.city_name = page.city_name;
        }
        if self.bounds.is_none() {
            self.bounds = page.bounds;
        }
    }
}

//! Uniform square grid generation.
//!
//! Bounds come from the layer's city borders (grown by
//! [`CITY_BORDER_BUFFER_DEGREES`]) when the city is registered, otherwise
//! from the feature extent grown by [`FEATURE_BUFFER_METERS`]. The grid
//! starts at the south-west corner and adds whole cells until the bounds
//! are strictly covered, so the last column and row may overhang the
//! east and north edges.

use geo::{Destination, Haversine, Point};
use market_map_layer_models::{BoundingBox, CityBorders, Feature, Properties};

use crate::{GridCell, GridError};

/// Buffer added around registered city borders, in degrees.
pub const CITY_BORDER_BUFFER_DEGREES: f64 = 0.1;

/// Buffer added around the feature extent, in meters.
pub const FEATURE_BUFFER_METERS: f64 = 1_000.0;

/// Largest grid the builder will produce.
pub const MAX_GRID_CELLS: usize = 1_000_000;

/// Generates square grids with a fixed cell side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBuilder {
    cell_side_km: f64,
}

impl GridBuilder {
    /// Creates a builder from a grid size in meters.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidCellSize`] if `grid_size_meters` is not a
    /// positive, finite number.
    pub fn from_meters(grid_size_meters: f64) -> Result<Self, GridError> {
        if !grid_size_meters.is_finite() || grid_size_meters <= 0.0 {
            return Err(GridError::InvalidCellSize {
                meters: grid_size_meters,
            });
        }
        Ok(Self {
            cell_side_km: grid_size_meters / 1_000.0,
        })
    }

    /// Cell side in kilometers.
    #[must_use]
    pub const fn cell_side_km(&self) -> f64 {
        self.cell_side_km
    }

    /// Resolves the region to grid.
    ///
    /// Returns `None` only when there are no city borders and no features.
    #[must_use]
    pub fn resolve_bounds(features: &[Feature], city: Option<&CityBorders>) -> Option<BoundingBox> {
        if let Some(city) = city {
            let bounds = city.to_bounds();
            if bounds.is_valid() {
                log::debug!("Using borders of '{}' for the grid", city.name);
                return Some(bounds.expand(CITY_BORDER_BUFFER_DEGREES));
            }
            log::warn!(
                "City '{}' has invalid borders; falling back to the feature extent",
                city.name
            );
        }

        let extent = BoundingBox::from_points(features.iter().map(|f| f.coordinates))?;
        Some(buffer_meters(&extent, FEATURE_BUFFER_METERS))
    }

    /// Lays the grid over `bounds`, giving every cell a copy of `template`.
    ///
    /// Cells are generated column by column from the south-west corner; a
    /// cell's `id` is its position in that order.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidBounds`] for non-finite or inverted bounds
    /// and [`GridError::TooManyCells`] when the grid would exceed
    /// [`MAX_GRID_CELLS`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn build(
        &self,
        bounds: &BoundingBox,
        template: &Properties,
    ) -> Result<Vec<GridCell>, GridError> {
        if !bounds.is_valid() {
            return Err(GridError::InvalidBounds {
                message: format!("{bounds:?} is not a finite, non-inverted box"),
            });
        }

        let (cell_width, cell_height) = self.cell_degrees(bounds)?;

        let columns = (bounds.width() / cell_width).floor() as usize + 1;
        let rows = (bounds.height() / cell_height).floor() as usize + 1;

        if columns.saturating_mul(rows) > MAX_GRID_CELLS {
            return Err(GridError::TooManyCells {
                columns,
                rows,
                limit: MAX_GRID_CELLS,
            });
        }

        log::debug!(
            "Building {columns}x{rows} grid ({} km cells) over {bounds:?}",
            self.cell_side_km
        );

        let mut cells = Vec::with_capacity(columns * rows);
        for column in 0..columns {
            let west = (column as f64).mul_add(cell_width, bounds.west);
            let east = west + cell_width;
            for row in 0..rows {
                let south = (row as f64).mul_add(cell_height, bounds.south);
                let north = south + cell_height;
                cells.push(GridCell {
                    id: cells.len(),
                    bounds: BoundingBox::new(west, south, east, north),
                    properties: template.clone(),
                    summary: None,
                });
            }
        }

        Ok(cells)
    }

    /// Cell width and height in degrees at the south-west corner.
    fn cell_degrees(&self, bounds: &BoundingBox) -> Result<(f64, f64), GridError> {
        let meters = self.cell_side_km * 1_000.0;
        let origin = Point::new(bounds.west, bounds.south);
        let east = Haversine.destination(origin, 90.0, meters);
        let north = Haversine.destination(origin, 0.0, meters);

        let width = east.x() - origin.x();
        let height = north.y() - origin.y();

        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(GridError::InvalidBounds {
                message: format!(
                    "cannot derive a {meters} m cell at ({}, {})",
                    bounds.west, bounds.south
                ),
            });
        }

        Ok((width, height))
    }
}

/// Grows `bounds` by `meters` on every side.
///
/// The east/west growth is measured at whichever edge latitude is farther
/// from the equator, so the buffer is at least `meters` wide everywhere.
#[must_use]
pub fn buffer_meters(bounds: &BoundingBox, meters: f64) -> BoundingBox {
    let lng_lat = if bounds.south.abs() > bounds.north.abs() {
        bounds.south
    } else {
        bounds.north
    };

    let south = Haversine.destination(Point::new(bounds.west, bounds.south), 180.0, meters);
    let north = Haversine.destination(Point::new(bounds.east, bounds.north), 0.0, meters);
    let west = Haversine.destination(Point::new(bounds.west, lng_lat), 270.0, meters);
    let east = Haversine.destination(Point::new(bounds.east, lng_lat), 90.0, meters);

    BoundingBox::new(west.x(), south.y(), east.x(), north.y())
}

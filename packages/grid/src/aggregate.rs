//! Per-cell aggregation over the points a cell contains.

use market_map_layer_models::{Feature, PropertyValue};
use market_map_spatial::SpatialIndex;

use crate::stats::collect_stats;
use crate::{CellSummary, GridCell, round2};

/// Aggregates every cell of `grid` against the points in `index`.
///
/// See [`aggregate_cell`] for the per-cell rules.
#[must_use]
pub fn aggregate(
    grid: &[GridCell],
    index: &SpatialIndex,
    weight_property: Option<&str>,
) -> Vec<GridCell> {
    grid.iter()
        .map(|cell| aggregate_cell(cell, index, weight_property))
        .collect()
}

/// Produces a new cell carrying the statistics of the points inside
/// `cell`.
///
/// * `density` is the sum of `weight_property` over the contained points
///   (missing or non-numeric values count as `0`), or the point count when
///   no weight property is given.
/// * Every numeric-coercible property is summed and attached, rounded to
///   two decimals, on top of the cell's template properties.
///
/// A cell whose centroid is not a finite pair is logged and returned as-is.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_cell(
    cell: &GridCell,
    index: &SpatialIndex,
    weight_property: Option<&str>,
) -> GridCell {
    let Some(center) = cell.center() else {
        log::warn!(
            "Cell {} has no valid center ({:?}); leaving it unaggregated",
            cell.id,
            cell.bounds
        );
        return cell.clone();
    };

    let contained: Vec<&Feature> = index
        .search(&cell.bounds)
        .into_iter()
        .filter(|f| cell.owns(f.coordinates))
        .collect();

    let point_count = contained.len();
    let weight = weight_property.map(str::trim).filter(|w| !w.is_empty());
    let density = weight.map_or(point_count as f64, |key| {
        contained
            .iter()
            .map(|f| {
                f.property(key)
                    .and_then(PropertyValue::as_number)
                    .unwrap_or(0.0)
            })
            .sum::<f64>()
            .max(0.0)
    });

    let stats = collect_stats(&contained);

    let mut properties = cell.properties.clone();
    for (key, s) in &stats {
        properties.insert(key.clone(), PropertyValue::Number(round2(s.sum)));
    }

    GridCell {
        id: cell.id,
        bounds: cell.bounds,
        properties,
        summary: Some(CellSummary {
            center,
            density,
            point_count,
            stats,
        }),
    }
}

#[cfg(test)]
mod tests {
    use market_map_layer_models::{BoundingBox, LngLat, Properties};

    use super::*;
    use crate::GridBuilder;

    fn feature(lng: f64, lat: f64, props: &[(&str, PropertyValue)]) -> Feature {
        let properties: Properties = props
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        Feature::new(LngLat::new(lng, lat), properties)
    }

    fn grid_for(features: &[Feature], meters: f64) -> Vec<GridCell> {
        let bounds = GridBuilder::resolve_bounds(features, None).unwrap();
        GridBuilder::from_meters(meters)
            .unwrap()
            .build(&bounds, &Properties::new())
            .unwrap()
    }

    #[test]
    fn four_corners_of_a_two_km_square() {
        // 2 km is ~0.017986 degrees at the equator.
        let side = 0.017_986;
        let sales = [("sales", PropertyValue::Number(10.0))];
        let features = vec![
            feature(0.0, 0.0, &sales),
            feature(side, 0.0, &sales),
            feature(0.0, side, &sales),
            feature(side, side, &sales),
        ];
        let grid = grid_for(&features, 1_000.0);
        let index = SpatialIndex::build(&features);

        let cells = aggregate(&grid, &index, None);
        let occupied: Vec<&GridCell> = cells.iter().filter(|c| c.point_count() > 0).collect();

        assert_eq!(occupied.len(), 4);
        for cell in occupied {
            assert_eq!(cell.point_count(), 1);
            assert!((cell.density() - 1.0).abs() < f64::EPSILON);
            assert_eq!(cell.properties["sales"], PropertyValue::Number(10.0));
        }
    }

    #[test]
    fn density_falls_back_to_point_count() {
        let features: Vec<Feature> = (0..30)
            .map(|i| {
                let t = f64::from(i);
                feature(
                    46.0 + (t * 0.9).sin() * 0.05,
                    24.0 + (t * 1.3).cos() * 0.05,
                    &[("sales", PropertyValue::Number(t))],
                )
            })
            .collect();
        let grid = grid_for(&features, 2_000.0);
        let cells = aggregate(&grid, &SpatialIndex::build(&features), None);

        for cell in &cells {
            assert!((cell.density() - cell.point_count() as f64).abs() < f64::EPSILON);
        }
        let total: usize = cells.iter().map(GridCell::point_count).sum();
        assert_eq!(total, features.len());
    }

    #[test]
    fn property_sums_add_up_across_cells() {
        let features: Vec<Feature> = (0..40)
            .map(|i| {
                let t = f64::from(i);
                let value = if i % 7 == 0 {
                    PropertyValue::from("n/a")
                } else {
                    PropertyValue::Number(t * 1.333)
                };
                feature(
                    46.0 + (t * 0.41).sin() * 0.08,
                    24.0 + (t * 0.67).cos() * 0.08,
                    &[("revenue", value)],
                )
            })
            .collect();
        let expected: f64 = features
            .iter()
            .filter_map(|f| f.property("revenue").and_then(PropertyValue::as_number))
            .sum();

        let grid = grid_for(&features, 1_500.0);
        let cells = aggregate(&grid, &SpatialIndex::build(&features), None);
        let actual: f64 = cells
            .iter()
            .filter_map(|c| c.properties.get("revenue").and_then(PropertyValue::as_number))
            .sum();

        assert!((actual - expected).abs() <= 0.01 * cells.len() as f64);
    }

    #[test]
    fn weight_property_drives_density() {
        let features = vec![
            feature(0.001, 0.001, &[("visits", PropertyValue::Number(3.0))]),
            feature(0.002, 0.002, &[("visits", PropertyValue::from("4"))]),
            feature(0.003, 0.003, &[("visits", PropertyValue::from("oops"))]),
            feature(0.004, 0.004, &[]),
        ];
        let cell = GridCell {
            id: 0,
            bounds: BoundingBox::new(0.0, 0.0, 0.01, 0.01),
            properties: Properties::new(),
            summary: None,
        };
        let out = aggregate_cell(&cell, &SpatialIndex::build(&features), Some("visits"));
        assert_eq!(out.point_count(), 4);
        assert!((out.density() - 7.0).abs() < f64::EPSILON);

        let stats = &out.summary.unwrap().stats["visits"];
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn shared_edge_points_are_counted_once() {
        let features = vec![feature(0.01, 0.005, &[])];
        let left = GridCell {
            id: 0,
            bounds: BoundingBox::new(0.0, 0.0, 0.01, 0.01),
            properties: Properties::new(),
            summary: None,
        };
        let right = GridCell {
            id: 1,
            bounds: BoundingBox::new(0.01, 0.0, 0.02, 0.01),
            properties: Properties::new(),
            summary: None,
        };
        let cells = aggregate(&[left, right], &SpatialIndex::build(&features), None);
        assert_eq!(cells[0].point_count(), 0);
        assert_eq!(cells[1].point_count(), 1);
    }

    #[test]
    fn corrupt_cells_pass_through_unchanged() {
        let corrupt = GridCell {
            id: 9,
            bounds: BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0),
            properties: Properties::new(),
            summary: None,
        };
        let out = aggregate_cell(&corrupt, &SpatialIndex::build(&[]), None);
        assert!(out.summary.is_none());
        assert_eq!(out.id, 9);
    }

    #[test]
    fn sums_are_rounded_to_two_decimals() {
        let features = vec![
            feature(0.001, 0.001, &[("price", PropertyValue::Number(1.004))]),
            feature(0.002, 0.002, &[("price", PropertyValue::Number(2.003))]),
        ];
        let cell = GridCell {
            id: 0,
            bounds: BoundingBox::new(0.0, 0.0, 0.01, 0.01),
            properties: Properties::new(),
            summary: None,
        };
        let out = aggregate_cell(&cell, &SpatialIndex::build(&features), None);
        assert_eq!(out.properties["price"], PropertyValue::Number(3.01));
    }
}

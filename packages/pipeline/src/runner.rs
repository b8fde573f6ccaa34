//! Grid, heatmap, and gradient runs over stored layers.

use std::sync::Arc;

use market_map_dispatch::{DispatchProgress, Generation, GenerationTracker, Pipeline};
use market_map_geography::registry::CityRegistry;
use market_map_gradient::{GradientCirclePaint, GradientService, GradientZoneEngine};
use market_map_gradient_models::GradientRequest;
use market_map_grid::builder::{FEATURE_BUFFER_METERS, buffer_meters};
use market_map_grid::{DensityThresholds, GridBuilder, GridCell, GridPaint, aggregate, paint};
use market_map_heatmap::{HeatmapPaint, HeatmapStats, normalize_with_densities, raw_density};
use market_map_layer_models::{BoundingBox, Feature, Layer, LayerId, Properties};
use market_map_spatial::SpatialIndex;
use serde_json::json;

use crate::store::LayerStore;
use crate::{PipelineConfig, PipelineError, RunOutcome};

/// Units handed to each worker, relative to the concurrency.
const UNITS_PER_WORKER: usize = 4;

/// Result of a grid run.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOutput {
    /// Layer the grid was built for.
    pub layer_id: LayerId,
    /// Aggregated cells in generation order.
    pub cells: Vec<GridCell>,
    /// Density cut points the paint was planned from.
    pub thresholds: DensityThresholds,
    /// Fill paint for the cells.
    pub paint: GridPaint,
}

impl GridOutput {
    /// Renderer-ready document: the paint plus the cells as `GeoJSON`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "grid",
            "layer_id": self.layer_id,
            "paint": self.paint,
            "thresholds": self.thresholds,
            "cells": market_map_grid::cells_to_feature_collection(&self.cells),
        })
    }
}

/// Result of a heatmap run.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapOutput {
    /// Copy of the input layer with `density` set on every feature.
    pub layer: Layer,
    /// Stats of the normalization.
    pub stats: HeatmapStats,
    /// Heatmap paint over `density`.
    pub paint: HeatmapPaint,
}

impl HeatmapOutput {
    /// Renderer-ready document: the paint, the stats, and the features.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "heatmap",
            "layer_id": self.layer.id,
            "paint": self.paint,
            "stats": self.stats,
            "layer": self.layer.to_feature_collection(),
        })
    }
}

/// Result of a gradient run.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientOutput {
    /// The recolored layer, as stored after the run.
    pub layer: Layer,
    /// Circle paint reading `gradient_color`, falling back to the layer's
    /// points color.
    pub paint: GradientCirclePaint,
}

impl GradientOutput {
    /// Renderer-ready document: the paint plus the recolored features.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "gradient",
            "layer_id": self.layer.id,
            "paint": self.paint,
            "layer": self.layer.to_feature_collection(),
        })
    }
}

/// Runs the layer pipelines on the worker pool.
///
/// Every grid or heatmap run takes a new generation for its layer; a run
/// that finishes after a newer run for the same layer has started reports
/// [`RunOutcome::Superseded`] instead of its result.
pub struct MapPipeline {
    config: PipelineConfig,
    dispatch: Pipeline,
    cities: CityRegistry,
    generations: GenerationTracker<LayerId>,
    progress: Arc<dyn DispatchProgress>,
}

impl MapPipeline {
    #[must_use]
    pub fn new(config: PipelineConfig, cities: CityRegistry) -> Self {
        Self {
            dispatch: Pipeline::new(config.concurrency),
            config,
            cities,
            generations: GenerationTracker::new(),
            progress: Arc::new(()),
        }
    }

    /// Reports per-unit progress of every run to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn DispatchProgress>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub const fn cities(&self) -> &CityRegistry {
        &self.cities
    }

    /// Starts a new run for `layer_id`, superseding any run in flight.
    pub fn begin_run(&self, layer_id: LayerId) -> Generation {
        self.generations.begin(&layer_id)
    }

    /// Wraps a finished run's `value`, dropping it if a newer run for
    /// `layer_id` has started since `generation` was taken.
    pub fn settle<T>(&self, layer_id: LayerId, generation: Generation, value: T) -> RunOutcome<T> {
        if self.generations.is_current(&layer_id, generation) {
            RunOutcome::Completed(value)
        } else {
            log::info!(
                "Discarding result of run {} for layer {layer_id}: superseded",
                generation.get()
            );
            RunOutcome::Superseded
        }
    }

    /// Grids `layer`, aggregates the cells in parallel, and plans the paint.
    ///
    /// `grid_size_meters` overrides the configured cell side.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::Grid`] for an invalid cell size or an oversized
    ///   grid.
    /// * [`PipelineError::NoBounds`] if the layer has no features, no known
    ///   city, and no bounds.
    /// * [`PipelineError::Dispatch`] if a worker panicked.
    pub async fn run_grid(
        &self,
        layer: &Layer,
        grid_size_meters: Option<f64>,
    ) -> Result<RunOutcome<GridOutput>, PipelineError> {
        let generation = self.begin_run(layer.id);
        let builder =
            GridBuilder::from_meters(grid_size_meters.unwrap_or(self.config.grid_size_meters))?;

        let city = layer
            .city_name
            .as_deref()
            .and_then(|name| self.cities.find(name));
        let bounds = GridBuilder::resolve_bounds(&layer.features, city)
            .or_else(|| {
                layer
                    .bounds
                    .filter(BoundingBox::is_valid)
                    .map(|b| buffer_meters(&b, FEATURE_BUFFER_METERS))
            })
            .ok_or(PipelineError::NoBounds { id: layer.id })?;

        let grid = builder.build(&bounds, &Properties::new())?;
        log::info!(
            "Aggregating {} features into {} cells for layer {}",
            layer.features.len(),
            grid.len(),
            layer.id
        );

        let index = Arc::new(SpatialIndex::build(&layer.features));
        let weight = layer.weight_property().map(str::to_string);
        let units = split(&grid, self.dispatch.concurrency());

        let aggregated = self
            .dispatch
            .run(
                units,
                move |unit: Vec<GridCell>| aggregate(&unit, &index, weight.as_deref()),
                &*self.progress,
            )
            .await?;

        let cells: Vec<GridCell> = aggregated.into_iter().flatten().collect();
        let thresholds = paint::plan(&cells);
        let output = GridOutput {
            layer_id: layer.id,
            paint: GridPaint::new(&thresholds, &layer.points_color),
            thresholds,
            cells,
        };

        Ok(self.settle(layer.id, generation, output))
    }

    /// Computes raw heatmap weights in parallel and normalizes them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Dispatch`] if a worker panicked.
    pub async fn run_heatmap(
        &self,
        layer: &Layer,
    ) -> Result<RunOutcome<HeatmapOutput>, PipelineError> {
        let generation = self.begin_run(layer.id);
        log::info!(
            "Weighting {} features for heatmap layer {}",
            layer.features.len(),
            layer.id
        );

        let weight = layer.weight_property().map(str::to_string);
        let units = split(&layer.features, self.dispatch.concurrency());

        let raw: Vec<f64> = self
            .dispatch
            .run(
                units,
                move |unit: Vec<Feature>| {
                    unit.iter()
                        .map(|f| raw_density(f, weight.as_deref()))
                        .collect::<Vec<f64>>()
                },
                &*self.progress,
            )
            .await?
            .into_iter()
            .flatten()
            .collect();

        let result = normalize_with_densities(&layer.features, &raw);
        let output = HeatmapOutput {
            layer: Layer {
                features: result.features,
                is_heatmap: true,
                ..layer.clone()
            },
            stats: result.stats,
            paint: HeatmapPaint::default(),
        };

        Ok(self.settle(layer.id, generation, output))
    }

    /// Requests a gradient for a stored layer and swaps in the merged layer.
    ///
    /// The stored layer is only replaced when the whole request succeeds.
    /// Returns the new layer with its circle paint.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownLayer`] if `layer_id` is not stored,
    /// and [`PipelineError::Gradient`] for validation, service, or response
    /// failures.
    pub async fn apply_gradient<S: GradientService>(
        &self,
        store: &mut LayerStore,
        layer_id: LayerId,
        engine: &GradientZoneEngine<S>,
        request: &GradientRequest,
    ) -> Result<GradientOutput, PipelineError> {
        let mut layer = store
            .get(layer_id)
            .cloned()
            .ok_or(PipelineError::UnknownLayer { id: layer_id })?;

        engine.apply_gradient(&mut layer, request).await?;
        let output = GradientOutput {
            paint: GradientCirclePaint::new(&layer.points_color),
            layer: layer.clone(),
        };
        store.replace(layer)?;
        Ok(output)
    }
}

/// Splits `items` into roughly `concurrency * UNITS_PER_WORKER` contiguous
/// units, preserving order.
fn split<T: Clone>(items: &[T], concurrency: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items
        .len()
        .div_ceil(concurrency.max(1) * UNITS_PER_WORKER)
        .max(1);
    items.chunks(size).map(<[T]>::to_vec).collect()
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Orchestration of the market map pipelines.
//!
//! Layers arrive page by page from the dataset API and are accumulated in
//! a [`LayerStore`] under stable [`LayerId`]s. A [`MapPipeline`] runs the
//! grid and heatmap pipelines for a layer on the worker pool and applies
//! gradient recoloring through a
//! [`GradientZoneEngine`](market_map_gradient::GradientZoneEngine).

pub mod config;
pub mod runner;
pub mod store;

use market_map_dispatch::DispatchError;
use market_map_geography::GeographyError;
use market_map_geography::registry::CityRegistry;
use market_map_gradient::GradientError;
use market_map_grid::GridError;
use market_map_layer_models::{LayerError, LayerId};
use thiserror::Error;

pub use config::PipelineConfig;
pub use runner::{GradientOutput, GridOutput, HeatmapOutput, MapPipeline};
pub use store::LayerStore;

/// Errors from pipeline runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Layer data could not be parsed.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// The grid could not be built.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Gradient recoloring failed.
    #[error(transparent)]
    Gradient(#[from] GradientError),

    /// A worker failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// City borders could not be loaded.
    #[error(transparent)]
    Geography(#[from] GeographyError),

    /// No stored layer has this ID.
    #[error("Unknown layer {id}")]
    UnknownLayer {
        /// The ID that was looked up.
        id: LayerId,
    },

    /// Nothing to grid over: no features, no known city, no bounds.
    #[error("Layer {id} has no features, known city, or bounds to grid")]
    NoBounds {
        /// The layer that was gridded.
        id: LayerId,
    },

    /// An environment variable holds an invalid value.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Which variable is wrong and why.
        message: String,
    },
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T> {
    /// The run finished and is still the latest for its layer.
    Completed(T),
    /// A newer run for the same layer started; the result was discarded.
    Superseded,
}

impl<T> RunOutcome<T> {
    /// The result, if the run was not superseded.
    #[must_use]
    pub fn into_completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Superseded => None,
        }
    }

    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

/// Builds the city registry: the embedded cities, overlaid with the
/// borders from `MARKET_MAP_CITY_BORDERS_URL` when configured.
///
/// # Errors
///
/// Returns [`PipelineError::Geography`] if the configured endpoint cannot
/// be fetched or parsed.
pub async fn load_city_registry(
    config: &PipelineConfig,
    client: &reqwest::Client,
) -> Result<CityRegistry, PipelineError> {
    let mut registry = CityRegistry::embedded();

    if let Some(url) = &config.city_borders_url {
        let fetched = market_map_geography::lookup::fetch_city_borders(client, url).await?;
        log::info!("Loaded {} city borders from {url}", fetched.len());
        registry.extend(fetched);
    }

    Ok(registry)
}

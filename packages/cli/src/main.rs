#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `market_map`: run the grid, heatmap, and gradient pipelines on
//! `GeoJSON` layer files.
//!
//! Every command accepts several `--input` files; pages of the same
//! dataset layer (same `prdcer_lyr_id`) are merged into one layer before
//! the pipeline runs. Results are written as JSON to `--output`, or to
//! stdout.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use market_map_cli_utils::{DEFAULT_LOG_FILTER, RunBar, UnitKind};
use market_map_gradient::{GradientZoneEngine, HttpGradientService};
use market_map_layer_models::{Layer, LayerId};
use market_map_pipeline::{
    LayerStore, MapPipeline, PipelineConfig, RunOutcome, load_city_registry,
};

#[derive(Parser)]
#[command(name = "market_map", about = "Grid, heatmap, and gradient analytics for map layers")]
struct Cli {
    /// Worker count (overrides `MARKET_MAP_CONCURRENCY`)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a layer into a square grid and plan its fill paint
    Grid {
        /// `GeoJSON` `FeatureCollection` page(s) of the layer
        #[arg(long, required = true)]
        input: Vec<PathBuf>,
        /// Cell side in meters (overrides `MARKET_MAP_GRID_SIZE_METERS`)
        #[arg(long)]
        grid_size: Option<f64>,
        /// City whose borders bound the grid (overrides the layer's `city_name`)
        #[arg(long)]
        city: Option<String>,
        /// Property summed into the cell density (overrides the layer's `basedon`)
        #[arg(long)]
        weight: Option<String>,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Normalize per-feature heatmap densities
    Heatmap {
        /// `GeoJSON` `FeatureCollection` page(s) of the layer
        #[arg(long, required = true)]
        input: Vec<PathBuf>,
        /// Property used as the raw weight (overrides the layer's `basedon`)
        #[arg(long)]
        weight: Option<String>,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Recolor a layer through the gradient service
    Gradient {
        /// `GeoJSON` `FeatureCollection` page(s) of the change layer
        #[arg(long, required = true)]
        input: Vec<PathBuf>,
        /// JSON file holding the gradient request
        #[arg(long)]
        request: PathBuf,
        /// Gradient service endpoint (overrides `MARKET_MAP_GRADIENT_URL`)
        #[arg(long)]
        url: Option<String>,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the cities with known borders
    Cities,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = market_map_cli_utils::init_logging(DEFAULT_LOG_FILTER);
    let cli = Cli::parse();

    let mut config = PipelineConfig::from_env()?;
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency.max(1);
    }

    let client = reqwest::Client::new();
    let cities = load_city_registry(&config, &client).await?;

    match cli.command {
        Commands::Grid {
            input,
            grid_size,
            city,
            weight,
            output,
        } => {
            let mut layer = load_layer(&input).await?;
            if city.is_some() {
                layer.city_name = city;
            }
            if let Some(weight) = weight {
                layer.basedon = weight;
            }
            layer.is_grid = true;

            let pipeline = MapPipeline::new(config, cities)
                .with_progress(RunBar::attach(&multi, UnitKind::Cells));

            match pipeline.run_grid(&layer, grid_size).await? {
                RunOutcome::Completed(grid) => {
                    log::info!(
                        "Built {} cells (max density {})",
                        grid.cells.len(),
                        grid.thresholds.max_density
                    );
                    write_output(output.as_deref(), &grid.to_json()).await?;
                }
                RunOutcome::Superseded => log::warn!("Grid run was superseded"),
            }
        }
        Commands::Heatmap {
            input,
            weight,
            output,
        } => {
            let mut layer = load_layer(&input).await?;
            if let Some(weight) = weight {
                layer.basedon = weight;
            }

            let pipeline = MapPipeline::new(config, cities)
                .with_progress(RunBar::attach(&multi, UnitKind::Features));

            match pipeline.run_heatmap(&layer).await? {
                RunOutcome::Completed(heatmap) => {
                    log::info!(
                        "Normalized {} features ({} unique weights)",
                        heatmap.stats.feature_count,
                        heatmap.stats.unique_values
                    );
                    write_output(output.as_deref(), &heatmap.to_json()).await?;
                }
                RunOutcome::Superseded => log::warn!("Heatmap run was superseded"),
            }
        }
        Commands::Gradient {
            input,
            request,
            url,
            output,
        } => {
            let Some(url) = url.or_else(|| config.gradient_url.clone()) else {
                return Err(
                    "no gradient service URL: pass --url or set MARKET_MAP_GRADIENT_URL".into(),
                );
            };

            let mut store = LayerStore::new();
            let layer_id = ingest_files(&mut store, &input).await?;
            let request =
                market_map_gradient::parse_request(&tokio::fs::read_to_string(&request).await?)?;

            let engine =
                GradientZoneEngine::new(HttpGradientService::with_client(client.clone(), url));
            let pipeline = MapPipeline::new(config, cities);
            let gradient = pipeline
                .apply_gradient(&mut store, layer_id, &engine, &request)
                .await?;

            log::info!(
                "Recolored {} features into {} groups",
                gradient.layer.features.len(),
                gradient.layer.gradient_groups.len()
            );
            write_output(output.as_deref(), &gradient.to_json()).await?;
        }
        Commands::Cities => {
            for city in cities.iter() {
                let b = city.to_bounds();
                println!(
                    "{:<16} [{:.4}, {:.4}, {:.4}, {:.4}]",
                    city.name, b.west, b.south, b.east, b.north
                );
            }
        }
    }

    Ok(())
}

/// Reads every page in `paths` into `store` and returns the ID of the
/// layer the last page landed in.
async fn ingest_files(
    store: &mut LayerStore,
    paths: &[PathBuf],
) -> Result<LayerId, Box<dyn std::error::Error>> {
    let mut last = None;
    for path in paths {
        let text = tokio::fs::read_to_string(path).await?;
        let page = Layer::from_geojson_str(&text)?;
        log::info!("Read {} features from {}", page.features.len(), path.display());
        last = Some(store.ingest_page(page));
    }
    last.ok_or_else(|| "no input files".into())
}

/// Reads every page in `paths` and returns the accumulated layer.
async fn load_layer(paths: &[PathBuf]) -> Result<Layer, Box<dyn std::error::Error>> {
    let mut store = LayerStore::new();
    let id = ingest_files(&mut store, paths).await?;
    if store.len() > 1 {
        log::warn!(
            "Inputs hold {} different layers; using the last one",
            store.len()
        );
    }
    store
        .remove(id)
        .ok_or_else(|| format!("layer {id} missing after ingest").into())
}

async fn write_output(
    path: Option<&Path>,
    value: &serde_json::Value,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            tokio::fs::write(path, text).await?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

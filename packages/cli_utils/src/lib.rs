#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the `market_map` binary: one progress bar per
//! dispatched run, and log lines routed around the bars.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use market_map_dispatch::DispatchProgress;

pub use indicatif::MultiProgress;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// What the units of a run are made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Chunks of grid cells being aggregated.
    Cells,
    /// Chunks of features being weighted.
    Features,
}

impl UnitKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Cells => "cells",
            Self::Features => "features",
        }
    }
}

/// Progress bar for one kind of dispatched run.
pub struct RunBar {
    bar: ProgressBar,
    kind: UnitKind,
}

impl RunBar {
    /// Adds a bar for `kind` runs to `multi`. The bar stays empty until a
    /// run starts.
    #[must_use]
    pub fn attach(multi: &MultiProgress, kind: UnitKind) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{prefix:>9.bold} {bar:32.green/black} {pos:>4}/{len} chunks [{elapsed}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        let bar = multi.add(ProgressBar::no_length().with_style(style));
        bar.set_prefix(kind.label());

        Arc::new(Self { bar, kind })
    }

    /// Units finished so far in the current run.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl DispatchProgress for RunBar {
    fn start(&self, units: u64) {
        self.bar.reset();
        self.bar.set_length(units);
    }

    fn unit_done(&self) {
        self.bar.inc(1);
    }

    fn complete(&self) {
        self.bar.finish();
        log::debug!(
            "Finished {} chunks of {} in {:?}",
            self.bar.position(),
            self.kind.label(),
            self.bar.elapsed()
        );
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge` and returns
/// the [`MultiProgress`] every [`RunBar`] must be attached to.
///
/// Filters come from `RUST_LOG`, or `default_filter` when it is unset. An
/// already-installed logger is left in place.
#[must_use]
pub fn init_logging(default_filter: &str) -> MultiProgress {
    let multi = MultiProgress::new();

    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .build();
    let max_level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}

/// A [`MultiProgress`] that draws nothing.
#[must_use]
pub fn hidden_progress() -> MultiProgress {
    MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
}

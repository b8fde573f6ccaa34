#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! City border registry used to resolve grid bounds.
//!
//! Borders come from two places: a registry of TOML files embedded at
//! compile time ([`registry`]), and the dataset API's city-borders endpoint
//! ([`lookup`]). Both produce [`CityBorders`] records keyed by city name.

pub mod lookup;
pub mod registry;

pub use market_map_layer_models::CityBorders;
use thiserror::Error;

/// Errors from city border operations.
#[derive(Debug, Error)]
pub enum GeographyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Embedded or fetched TOML could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The borders payload had an unexpected shape.
    #[error("Malformed borders response: {message}")]
    Malformed {
        /// Description of what went wrong.
        message: String,
    },
}

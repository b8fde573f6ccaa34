//! Pipeline configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `MARKET_MAP_CONCURRENCY` | available hardware parallelism, or 4 |
//! | `MARKET_MAP_GRID_SIZE_METERS` | `1000` |
//! | `MARKET_MAP_GRADIENT_URL` | unset |
//! | `MARKET_MAP_CITY_BORDERS_URL` | unset (embedded registry only) |

use market_map_dispatch::default_concurrency;

use crate::PipelineError;

/// Default grid cell side in meters.
pub const DEFAULT_GRID_SIZE_METERS: f64 = 1_000.0;

pub const CONCURRENCY_VAR: &str = "MARKET_MAP_CONCURRENCY";
pub const GRID_SIZE_VAR: &str = "MARKET_MAP_GRID_SIZE_METERS";
pub const GRADIENT_URL_VAR: &str = "MARKET_MAP_GRADIENT_URL";
pub const CITY_BORDERS_URL_VAR: &str = "MARKET_MAP_CITY_BORDERS_URL";

/// Settings shared by every pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum units of work in flight.
    pub concurrency: usize,
    /// Grid cell side used when a run does not specify one.
    pub grid_size_meters: f64,
    /// Endpoint of the gradient computation service.
    pub gradient_url: Option<String>,
    /// Endpoint returning city borders, merged over the embedded registry.
    pub city_borders_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            grid_size_meters: DEFAULT_GRID_SIZE_METERS,
            gradient_url: None,
            city_borders_url: None,
        }
    }
}

impl PipelineConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a variable is set to a value
    /// that does not parse.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, treating blank values as
    /// unset.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(raw) = get(CONCURRENCY_VAR) {
            config.concurrency = match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(PipelineError::Config {
                        message: format!("{CONCURRENCY_VAR} must be a positive integer, got '{raw}'"),
                    });
                }
            };
        }

        if let Some(raw) = get(GRID_SIZE_VAR) {
            config.grid_size_meters = match raw.parse::<f64>() {
                Ok(m) if m.is_finite() && m > 0.0 => m,
                _ => {
                    return Err(PipelineError::Config {
                        message: format!("{GRID_SIZE_VAR} must be a positive number, got '{raw}'"),
                    });
                }
            };
        }

        config.gradient_url = get(GRADIENT_URL_VAR);
        config.city_borders_url = get(CITY_BORDERS_URL_VAR);

        log::debug!("Pipeline config: {config:?}");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.concurrency >= 1);
        assert!((config.grid_size_meters - DEFAULT_GRID_SIZE_METERS).abs() < f64::EPSILON);
        assert_eq!(config.gradient_url, None);
        assert_eq!(config.city_borders_url, None);
    }

    #[test]
    fn reads_every_variable() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (CONCURRENCY_VAR, "6"),
            (GRID_SIZE_VAR, " 250.5 "),
            (GRADIENT_URL_VAR, "http://localhost:8000/gradient"),
            (CITY_BORDERS_URL_VAR, ""),
        ]))
        .unwrap();
        assert_eq!(config.concurrency, 6);
        assert!((config.grid_size_meters - 250.5).abs() < f64::EPSILON);
        assert_eq!(
            config.gradient_url.as_deref(),
            Some("http://localhost:8000/gradient")
        );
        assert_eq!(config.city_borders_url, None);
    }

    #[test]
    fn rejects_unparsable_values() {
        for vars in [
            [(CONCURRENCY_VAR, "0")],
            [(CONCURRENCY_VAR, "many")],
            [(GRID_SIZE_VAR, "-1")],
            [(GRID_SIZE_VAR, "NaN")],
        ] {
            let err = PipelineConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, PipelineError::Config { .. }));
        }
    }
}

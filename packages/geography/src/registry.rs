//! Compile-time registry of city borders.
//!
//! Each city is defined in a TOML file under `cities/`. The registry embeds
//! these at compile time; borders fetched at runtime can be merged on top
//! with [`CityRegistry::extend`].

use std::collections::BTreeMap;

use market_map_layer_models::CityBorders;

use crate::GeographyError;

// ── Compile-time embedded TOML files ────────────────────────────────

const CITY_TOMLS: &[(&str, &str)] = &[
    ("riyadh", include_str!("../cities/riyadh.toml")),
    ("jeddah", include_str!("../cities/jeddah.toml")),
    ("dammam", include_str!("../cities/dammam.toml")),
    ("mecca", include_str!("../cities/mecca.toml")),
];

/// City borders indexed by case-insensitive name.
#[derive(Debug, Clone, Default)]
pub struct CityRegistry {
    cities: BTreeMap<String, CityBorders>,
}

impl CityRegistry {
    /// Builds the registry from the embedded TOML files.
    ///
    /// # Panics
    ///
    /// Panics if any embedded TOML config is malformed.
    #[must_use]
    pub fn embedded() -> Self {
        let cities = CITY_TOMLS
            .iter()
            .map(|(name, toml_str)| {
                parse_city(toml_str)
                    .unwrap_or_else(|e| panic!("Failed to parse city borders '{name}': {e}"))
            })
            .collect();
        Self::from_cities(cities)
    }

    /// Builds a registry from a list of borders, dropping inverted or
    /// non-finite entries.
    #[must_use]
    pub fn from_cities(cities: Vec<CityBorders>) -> Self {
        let mut registry = Self::default();
        registry.extend(cities);
        registry
    }

    /// Adds or replaces entries. Later entries win on name collisions.
    pub fn extend(&mut self, cities: Vec<CityBorders>) {
        for city in cities {
            if !city.to_bounds().is_valid() {
                log::warn!("Ignoring city '{}' with invalid borders", city.name);
                continue;
            }
            self.cities.insert(normalize_name(&city.name), city);
        }
    }

    /// Looks up a city by name, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&CityBorders> {
        self.cities.get(&normalize_name(name))
    }

    /// Number of registered cities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    /// Returns `true` when no city is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// Iterates over registered cities in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CityBorders> {
        self.cities.values()
    }
}

/// Parses one city definition from TOML.
///
/// # Errors
///
/// Returns [`GeographyError::Toml`] if the text is not a valid city file.
pub fn parse_city(toml_str: &str) -> Result<CityBorders, GeographyError> {
    Ok(toml::from_str(toml_str)?)
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

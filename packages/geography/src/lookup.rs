//! City-borders endpoint client.
//!
//! The dataset API answers with a JSON array of
//! `{ name, borders: { northeast: {lat, lng}, southwest: {lat, lng} } }`
//! records, optionally wrapped in a `data` envelope.

use market_map_layer_models::CityBorders;

use crate::GeographyError;

/// Fetches all city borders from `url`.
///
/// # Errors
///
/// Returns [`GeographyError`] if the request fails, the server answers with
/// a non-success status, or the body is not a list of city borders.
pub async fn fetch_city_borders(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<CityBorders>, GeographyError> {
    log::info!("Fetching city borders from {url}");

    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(GeographyError::Malformed {
            message: format!("city borders request failed with status {}", resp.status()),
        });
    }

    let body: serde_json::Value = resp.json().await?;
    parse_response(body)
}

/// Parses a city-borders response body.
///
/// Entries that do not match the expected shape are skipped with a warning.
///
/// # Errors
///
/// Returns [`GeographyError::Malformed`] if the body holds no array of
/// cities.
pub fn parse_response(body: serde_json::Value) -> Result<Vec<CityBorders>, GeographyError> {
    let entries = match body {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(entries)) => entries,
            _ => {
                return Err(GeographyError::Malformed {
                    message: "response object has no 'data' array".to_string(),
                });
            }
        },
        other => {
            return Err(GeographyError::Malformed {
                message: format!("expected an array of cities, got {other}"),
            });
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<CityBorders>(entry) {
            Ok(city) => Some(city),
            Err(e) => {
                log::warn!("Skipping malformed city borders entry: {e}");
                None
            }
        })
        .collect())
}

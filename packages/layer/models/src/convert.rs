//! Conversion between [`Layer`]s and `GeoJSON` documents.
//!
//! Layer-level metadata travels as foreign members on the
//! `FeatureCollection` (`prdcer_lyr_id`, `bknd_dataset_id`, `basedon`, ...),
//! matching the dataset API payloads. Features whose geometry is not a
//! finite point are skipped with a warning rather than failing the batch.

use geojson::{GeoJson, Geometry, JsonObject, JsonValue, Value};

use crate::{
    BoundingBox, DEFAULT_POINTS_COLOR, Feature, GradientGroupSummary, Layer, LayerError, LngLat,
    Properties, PropertyValue,
};

impl Layer {
    /// Parses a `GeoJSON` `FeatureCollection` string into a new layer.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError`] if the text is not `GeoJSON` or is not a
    /// `FeatureCollection`.
    pub fn from_geojson_str(text: &str) -> Result<Self, LayerError> {
        match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(fc) => Ok(Self::from_feature_collection(fc)),
            GeoJson::Feature(_) => Err(LayerError::NotAFeatureCollection {
                kind: "Feature".to_string(),
            }),
            GeoJson::Geometry(_) => Err(LayerError::NotAFeatureCollection {
                kind: "Geometry".to_string(),
            }),
        }
    }

    /// Builds a layer from a parsed `FeatureCollection`.
    #[must_use]
    pub fn from_feature_collection(fc: geojson::FeatureCollection) -> Self {
        let members = fc.foreign_members.unwrap_or_default();

        let total = fc.features.len();
        let features: Vec<Feature> = fc
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(i, f)| match Feature::try_from(f) {
                Ok(feature) => Some(feature),
                Err(e) => {
                    log::warn!("Skipping feature {i}: {e}");
                    None
                }
            })
            .collect();

        if features.len() < total {
            log::warn!(
                "Kept {} of {total} features; the rest had invalid geometry",
                features.len()
            );
        }

        let mut layer = Self::new(features);
        layer.prdcer_lyr_id = string_member(&members, "prdcer_lyr_id");
        layer.bknd_dataset_id = string_member(&members, "bknd_dataset_id");
        layer.next_page_token = string_member(&members, "next_page_token");
        layer.layer_legend = string_member(&members, "layer_legend");
        layer.basedon = string_member(&members, "basedon").unwrap_or_default();
        layer.points_color = string_member(&members, "points_color")
            .unwrap_or_else(|| DEFAULT_POINTS_COLOR.to_string());
        layer.is_heatmap = bool_member(&members, "is_heatmap");
        layer.is_grid = bool_member(&members, "is_grid");
        layer.is_gradient = bool_member(&members, "is_gradient");
        layer.city_name = string_member(&members, "city_name");
        layer.bounds = members.get("bounds").and_then(parse_bounds);
        layer.gradient_based_on = string_member(&members, "gradient_based_on");
        layer.gradient_groups = members
            .get("gradient_groups")
            .cloned()
            .and_then(|v| serde_json::from_value::<Vec<GradientGroupSummary>>(v).ok())
            .unwrap_or_default();
        layer
    }

    /// Serializes the layer back into a `FeatureCollection`, metadata
    /// included as foreign members.
    #[must_use]
    pub fn to_feature_collection(&self) -> geojson::FeatureCollection {
        let mut members = JsonObject::new();
        members.insert("layer_id".to_string(), JsonValue::String(self.id.to_string()));
        insert_opt(&mut members, "prdcer_lyr_id", self.prdcer_lyr_id.as_deref());
        insert_opt(&mut members, "bknd_dataset_id", self.bknd_dataset_id.as_deref());
        insert_opt(&mut members, "next_page_token", self.next_page_token.as_deref());
        insert_opt(&mut members, "layer_legend", self.layer_legend.as_deref());
        members.insert("basedon".to_string(), JsonValue::String(self.basedon.clone()));
        members.insert(
            "points_color".to_string(),
            JsonValue::String(self.points_color.clone()),
        );
        members.insert("is_heatmap".to_string(), JsonValue::Bool(self.is_heatmap));
        members.insert("is_grid".to_string(), JsonValue::Bool(self.is_grid));
        members.insert("is_gradient".to_string(), JsonValue::Bool(self.is_gradient));
        insert_opt(&mut members, "city_name", self.city_name.as_deref());
        if let Some(bounds) = self.bounds {
            members.insert("bounds".to_string(), serde_json::json!(<[f64; 4]>::from(bounds)));
        }
        if self.is_gradient {
            members.insert(
                "gradient_groups".to_string(),
                serde_json::to_value(&self.gradient_groups).unwrap_or_default(),
            );
            insert_opt(&mut members, "gradient_based_on", self.gradient_based_on.as_deref());
        }

        geojson::FeatureCollection {
            bbox: None,
            features: self.features.iter().map(geojson::Feature::from).collect(),
            foreign_members: Some(members),
        }
    }
}

impl TryFrom<geojson::Feature> for Feature {
    type Error = LayerError;

    fn try_from(feature: geojson::Feature) -> Result<Self, Self::Error> {
        let geometry = feature.geometry.ok_or_else(|| LayerError::InvalidGeometry {
            message: "feature has no geometry".to_string(),
        })?;

        let position = match geometry.value {
            Value::Point(position) => position,
            other => {
                return Err(LayerError::InvalidGeometry {
                    message: format!("expected Point, got {}", geometry_kind(&other)),
                });
            }
        };

        if position.len() < 2 {
            return Err(LayerError::InvalidGeometry {
                message: format!("point has {} coordinates, expected 2", position.len()),
            });
        }

        let coordinates = LngLat::new(position[0], position[1]);
        if !coordinates.is_finite() {
            return Err(LayerError::InvalidGeometry {
                message: "point coordinates are not finite".to_string(),
            });
        }

        let properties: Properties = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, PropertyValue::from(v)))
            .collect();

        Ok(Self {
            id: feature.id,
            coordinates,
            properties,
        })
    }
}

impl From<&Feature> for geojson::Feature {
    fn from(feature: &Feature) -> Self {
        Self {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![
                feature.coordinates.lng,
                feature.coordinates.lat,
            ]))),
            id: feature.id.clone(),
            properties: Some(properties_to_json(&feature.properties)),
            foreign_members: None,
        }
    }
}

/// Converts a property bag into a `GeoJSON` properties object.
#[must_use]
pub fn properties_to_json(properties: &Properties) -> JsonObject {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), JsonValue::from(v)))
        .collect()
}

const fn geometry_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn string_member(members: &JsonObject, key: &str) -> Option<String> {
    match members.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_member(members: &JsonObject, key: &str) -> bool {
    members
        .get(key)
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

fn insert_opt(members: &mut JsonObject, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        members.insert(key.to_string(), JsonValue::String(v.to_string()));
    }
}

fn parse_bounds(value: &JsonValue) -> Option<BoundingBox> {
    let parts: Vec<f64> = value
        .as_array()?
        .iter()
        .filter_map(JsonValue::as_f64)
        .collect();
    let [west, south, east, north] = parts[..] else {
        return None;
    };
    let bounds = BoundingBox::new(west, south, east, north);
    bounds.is_valid().then_some(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"{
        "type": "FeatureCollection",
        "prdcer_lyr_id": "lyr-7",
        "bknd_dataset_id": "ds-1",
        "next_page_token": "tok",
        "basedon": "sales",
        "points_color": "#FF0000",
        "is_grid": true,
        "city_name": "Riyadh",
        "bounds": [46.0, 24.0, 47.0, 25.0],
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [46.5, 24.5]},
             "properties": {"sales": 10, "name": "a"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
             "properties": {}},
            {"type": "Feature", "geometry": null, "properties": {}}
        ]
    }"##;

    #[test]
    fn parses_metadata_and_skips_bad_geometry() {
        let layer = Layer::from_geojson_str(PAGE).unwrap();
        assert_eq!(layer.features.len(), 1);
        assert_eq!(layer.prdcer_lyr_id.as_deref(), Some("lyr-7"));
        assert_eq!(layer.bknd_dataset_id.as_deref(), Some("ds-1"));
        assert_eq!(layer.next_page_token.as_deref(), Some("tok"));
        assert_eq!(layer.weight_property(), Some("sales"));
        assert_eq!(layer.points_color, "#FF0000");
        assert!(layer.is_grid);
        assert!(!layer.is_heatmap);
        assert_eq!(layer.city_name.as_deref(), Some("Riyadh"));
        assert_eq!(layer.bounds, Some(BoundingBox::new(46.0, 24.0, 47.0, 25.0)));
        assert_eq!(
            layer.features[0].property("sales"),
            Some(&PropertyValue::Number(10.0))
        );
    }

    #[test]
    fn rejects_non_collections() {
        let err = Layer::from_geojson_str(
            r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::NotAFeatureCollection { .. }));
    }

    #[test]
    fn writes_metadata_as_foreign_members() {
        let layer = Layer::from_geojson_str(PAGE).unwrap();
        let fc = layer.to_feature_collection();
        let members = fc.foreign_members.unwrap();
        assert_eq!(members["prdcer_lyr_id"], "lyr-7");
        assert_eq!(members["is_grid"], true);
        assert_eq!(members["bounds"], serde_json::json!([46.0, 24.0, 47.0, 25.0]));
        assert!(!members.contains_key("gradient_groups"));
        assert_eq!(fc.features.len(), 1);
        assert_eq!(
            fc.features[0].properties.as_ref().unwrap()["name"],
            JsonValue::String("a".to_string())
        );
    }
}

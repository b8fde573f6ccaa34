//! Circle paint for gradient layers.

use market_map_layer_models::DEFAULT_POINTS_COLOR;
use serde::Serialize;

use crate::GRADIENT_COLOR_PROPERTY;

/// Declarative circle paint that colors each point by its bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientCirclePaint {
    /// `gradient_color` of the feature, or the fallback color.
    #[serde(rename = "circle-color")]
    pub circle_color: serde_json::Value,
    /// Circle radius in pixels.
    #[serde(rename = "circle-radius")]
    pub circle_radius: f64,
    /// Circle opacity in `[0, 1]`.
    #[serde(rename = "circle-opacity")]
    pub circle_opacity: f64,
}

impl GradientCirclePaint {
    /// Paint falling back to `default_color` for features outside every
    /// bucket.
    #[must_use]
    pub fn new(default_color: &str) -> Self {
        Self {
            circle_color: serde_json::json!([
                "coalesce",
                ["get", GRADIENT_COLOR_PROPERTY],
                default_color
            ]),
            circle_radius: 5.0,
            circle_opacity: 0.8,
        }
    }
}

impl Default for GradientCirclePaint {
    fn default() -> Self {
        Self::new(DEFAULT_POINTS_COLOR)
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Gradient zone recoloring.
//!
//! The spatial comparison itself runs in an external service behind the
//! [`GradientService`] trait. This crate validates requests before they
//! are sent, parses the returned buckets, and merges them back into the
//! change layer as a single recolored feature set.
//!
//! Layer updates are all-or-nothing: the merged layer is built in full
//! before it replaces the original, so a validation, transport, or parse
//! failure never leaves a layer half-updated.

pub mod merge;
pub mod paint;
pub mod service;
pub mod validate;

use market_map_gradient_models::{GradientGroup, GradientRequest};
use market_map_layer_models::Layer;
use thiserror::Error;

pub use merge::{
    GRADIENT_COLOR_PROPERTY, GRADIENT_LEGEND_PROPERTY, merge_gradient_groups, parse_groups,
};
pub use paint::GradientCirclePaint;
pub use service::{GradientService, HttpGradientService};
pub use validate::validate;

/// Errors from gradient recoloring.
#[derive(Debug, Error)]
pub enum GradientError {
    /// The request is missing required parameters or has invalid values.
    #[error("Invalid gradient request: {message}")]
    Validation {
        /// Every problem found, separated by `; `.
        message: String,
    },

    /// HTTP request to the gradient service failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered, but not with usable gradient groups.
    #[error("Malformed gradient response: {message}")]
    MalformedResponse {
        /// Description of what is wrong with the response.
        message: String,
    },

    /// The request targets a different layer than the one being updated.
    #[error("Request is for layer '{requested}' but was applied to layer '{actual}'")]
    LayerMismatch {
        /// `change_lyr_id` of the request.
        requested: String,
        /// Producer ID of the layer passed in.
        actual: String,
    },
}

/// Parses a gradient request from JSON text.
///
/// # Errors
///
/// Returns [`GradientError::Json`] if the text is not a request object.
pub fn parse_request(text: &str) -> Result<GradientRequest, GradientError> {
    Ok(serde_json::from_str(text)?)
}

/// Validates, dispatches, and merges gradient requests.
pub struct GradientZoneEngine<S> {
    service: S,
}

impl<S: GradientService> GradientZoneEngine<S> {
    /// Creates an engine that sends requests to `service`.
    pub const fn new(service: S) -> Self {
        Self { service }
    }

    /// The service requests are dispatched to.
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Validates `request`, sends it to the service, and parses the groups.
    ///
    /// Nothing is sent when validation fails.
    ///
    /// # Errors
    ///
    /// * [`GradientError::Validation`] if the request is incomplete.
    /// * Any error the service returns.
    /// * [`GradientError::MalformedResponse`] if the response is empty or
    ///   its groups carry no `features` arrays.
    pub async fn request_gradient(
        &self,
        request: &GradientRequest,
    ) -> Result<Vec<GradientGroup>, GradientError> {
        validate(request)?;

        log::info!(
            "Requesting gradient for '{}' based on '{}' ({} {})",
            request.change_lyr_id,
            request.based_on_lyr_id,
            request.coverage_value,
            request.coverage_property
        );

        let body = self.service.compute(request).await?;
        let groups = parse_groups(body)?;

        log::info!(
            "Gradient service returned {} groups for '{}'",
            groups.len(),
            request.change_lyr_id
        );

        Ok(groups)
    }

    /// Requests a gradient and merges it into `layer`.
    ///
    /// `layer` is only replaced once the merged layer has been fully built.
    ///
    /// # Errors
    ///
    /// Returns [`GradientError::Validation`] for an invalid request,
    /// [`GradientError::LayerMismatch`] if `layer` has a producer ID other
    /// than the request's `change_lyr_id`, and otherwise the errors of
    /// [`Self::request_gradient`]. `layer` is unchanged on error.
    pub async fn apply_gradient(
        &self,
        layer: &mut Layer,
        request: &GradientRequest,
    ) -> Result<(), GradientError> {
        validate(request)?;

        if let Some(actual) = &layer.prdcer_lyr_id
            && actual != request.change_lyr_id.trim()
        {
            return Err(GradientError::LayerMismatch {
                requested: request.change_lyr_id.clone(),
                actual: actual.clone(),
            });
        }

        let groups = self.request_gradient(request).await?;
        *layer = merge_gradient_groups(layer, &request.based_on_lyr_id, &groups);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use market_map_gradient_models::CoverageProperty;
    use market_map_layer_models::{Feature, LngLat, Properties};
    use serde_json::json;

    use super::*;

    struct StubService {
        calls: AtomicUsize,
        response: Mutex<Option<serde_json::Value>>,
    }

    impl StubService {
        fn answering(response: serde_json::Value) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Mutex::new(Some(response)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GradientService for StubService {
        async fn compute(
            &self,
            _request: &GradientRequest,
        ) -> Result<serde_json::Value, GradientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| GradientError::MalformedResponse {
                    message: "no response configured".to_string(),
                })
        }
    }

    fn request() -> GradientRequest {
        GradientRequest {
            change_lyr_id: "stores".to_string(),
            change_lyr_name: "Stores".to_string(),
            based_on_lyr_id: "competitors".to_string(),
            based_on_lyr_name: "Competitors".to_string(),
            coverage_property: CoverageProperty::Radius,
            coverage_value: 500.0,
            color_based_on: "visits".to_string(),
            color_grid_choice: vec!["#ffeda0".to_string(), "#f03b20".to_string()],
        }
    }

    fn point(lng: f64, lat: f64, name: &str) -> serde_json::Value {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [lng, lat] },
            "properties": { "name": name }
        })
    }

    fn groups_response() -> serde_json::Value {
        json!([
            {
                "points_color": "#ffeda0",
                "layer_legend": "0 - 10",
                "records_count": 2,
                "features": [point(46.70, 24.70, "a"), point(46.71, 24.71, "b")]
            },
            {
                "points_color": "#f03b20",
                "layer_legend": "10+",
                "records_count": 1,
                "features": [point(46.72, 24.72, "c")]
            }
        ])
    }

    fn stores_layer() -> Layer {
        let mut layer = Layer::new(vec![Feature::new(
            LngLat::new(46.7, 24.7),
            Properties::new(),
        )]);
        layer.prdcer_lyr_id = Some("stores".to_string());
        layer
    }

    #[tokio::test]
    async fn missing_based_on_layer_never_dispatches() {
        let engine = GradientZoneEngine::new(StubService::answering(groups_response()));
        let mut req = request();
        req.based_on_lyr_id = String::new();

        let err = engine.request_gradient(&req).await.unwrap_err();
        assert!(matches!(err, GradientError::Validation { .. }));
        assert!(err.to_string().contains("based_on_lyr_id"));
        assert_eq!(engine.service().calls(), 0);
    }

    #[tokio::test]
    async fn apply_merges_every_group() {
        let engine = GradientZoneEngine::new(StubService::answering(groups_response()));
        let mut layer = stores_layer();
        let id = layer.id;

        engine.apply_gradient(&mut layer, &request()).await.unwrap();

        assert_eq!(engine.service().calls(), 1);
        assert_eq!(layer.id, id);
        assert!(layer.is_gradient);
        assert_eq!(layer.gradient_based_on.as_deref(), Some("competitors"));
        assert_eq!(layer.features.len(), 3);
        assert_eq!(layer.gradient_groups.len(), 2);
        assert_eq!(layer.gradient_groups[1].count, 1);
    }

    #[tokio::test]
    async fn reapplying_the_same_response_is_idempotent() {
        let engine = GradientZoneEngine::new(StubService::answering(groups_response()));
        let mut layer = stores_layer();

        engine.apply_gradient(&mut layer, &request()).await.unwrap();
        let first = layer.clone();
        engine.apply_gradient(&mut layer, &request()).await.unwrap();

        assert_eq!(layer, first);
    }

    #[tokio::test]
    async fn malformed_response_leaves_layer_untouched() {
        for body in [json!([]), json!({ "data": [{ "points_color": "#fff" }] }), json!("oops")] {
            let engine = GradientZoneEngine::new(StubService::answering(body));
            let mut layer = stores_layer();
            let before = layer.clone();

            let err = engine.apply_gradient(&mut layer, &request()).await.unwrap_err();
            assert!(matches!(err, GradientError::MalformedResponse { .. }));
            assert_eq!(layer, before);
        }
    }

    #[tokio::test]
    async fn service_failure_leaves_layer_untouched() {
        let engine = GradientZoneEngine::new(StubService {
            calls: AtomicUsize::new(0),
            response: Mutex::new(None),
        });
        let mut layer = stores_layer();
        let before = layer.clone();

        assert!(engine.apply_gradient(&mut layer, &request()).await.is_err());
        assert_eq!(layer, before);
    }

    #[tokio::test]
    async fn refuses_to_recolor_another_layer() {
        let engine = GradientZoneEngine::new(StubService::answering(groups_response()));
        let mut layer = stores_layer();
        layer.prdcer_lyr_id = Some("warehouses".to_string());

        let err = engine.apply_gradient(&mut layer, &request()).await.unwrap_err();
        assert!(matches!(err, GradientError::LayerMismatch { .. }));
        assert_eq!(engine.service().calls(), 0);
    }

    #[tokio::test]
    async fn blank_change_layer_is_a_validation_error() {
        let engine = GradientZoneEngine::new(StubService::answering(groups_response()));
        let mut layer = stores_layer();
        let before = layer.clone();
        let mut req = request();
        req.change_lyr_id = String::new();

        let err = engine.apply_gradient(&mut layer, &req).await.unwrap_err();
        assert!(matches!(err, GradientError::Validation { .. }));
        assert!(err.to_string().contains("change_lyr_id"));
        assert_eq!(layer, before);
        assert_eq!(engine.service().calls(), 0);
    }

    #[test]
    fn parses_requests_from_json() {
        let req = parse_request(&serde_json::to_string(&request()).unwrap()).unwrap();
        assert_eq!(req, request());
        assert!(matches!(parse_request("{"), Err(GradientError::Json(_))));
    }
}

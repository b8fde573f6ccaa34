//! In-memory layer store keyed by stable layer IDs.
//!
//! Pages of the same dataset layer (same `prdcer_lyr_id`) are folded into
//! one logical layer as they arrive, so the layer keeps the [`LayerId`] it
//! got from its first page.

use std::collections::BTreeMap;

use market_map_layer_models::{Layer, LayerId};

use crate::PipelineError;

#[derive(Debug, Default)]
pub struct LayerStore {
    layers: BTreeMap<LayerId, Layer>,
    by_producer_id: BTreeMap<String, LayerId>,
}

impl LayerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one page of a layer and returns the ID of the logical layer it
    /// belongs to.
    ///
    /// A page whose `prdcer_lyr_id` matches a stored layer is appended to
    /// it; anything else becomes a new layer.
    pub fn ingest_page(&mut self, page: Layer) -> LayerId {
        if let Some(existing) = page
            .prdcer_lyr_id
            .as_ref()
            .and_then(|p| self.by_producer_id.get(p))
            .copied()
            && let Some(layer) = self.layers.get_mut(&existing)
        {
            let added = page.features.len();
            layer.extend_page(page);
            log::debug!(
                "Appended {added} features to layer {existing} ({} total, next page: {:?})",
                layer.features.len(),
                layer.next_page_token
            );
            return existing;
        }

        let id = page.id;
        if let Some(producer_id) = &page.prdcer_lyr_id {
            self.by_producer_id.insert(producer_id.clone(), id);
        }
        log::debug!("Stored new layer {id} with {} features", page.features.len());
        self.layers.insert(id, page);
        id
    }

    #[must_use]
    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Looks a layer up by its dataset producer ID.
    #[must_use]
    pub fn find_by_producer_id(&self, producer_id: &str) -> Option<&Layer> {
        self.by_producer_id
            .get(producer_id)
            .and_then(|id| self.layers.get(id))
    }

    /// Swaps in a new version of a stored layer, matched by `layer.id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownLayer`] if no layer has that ID.
    pub fn replace(&mut self, layer: Layer) -> Result<Layer, PipelineError> {
        let slot = self
            .layers
            .get_mut(&layer.id)
            .ok_or(PipelineError::UnknownLayer { id: layer.id })?;
        Ok(std::mem::replace(slot, layer))
    }

    /// Removes a layer, e.g. when the user switches data sources.
    pub fn remove(&mut self, id: LayerId) -> Option<Layer> {
        let layer = self.layers.remove(&id)?;
        if let Some(producer_id) = &layer.prdcer_lyr_id {
            self.by_producer_id.remove(producer_id);
        }
        Some(layer)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }
}

#[cfg(test)]
mod tests {
    use market_map_layer_models::{Feature, LngLat, Properties};

    use super::*;

    fn page(producer_id: Option<&str>, points: usize, token: Option<&str>) -> Layer {
        let features = (0..points)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let offset = i as f64 * 0.001;
                Feature::new(LngLat::new(46.7 + offset, 24.7), Properties::new())
            })
            .collect();
        let mut layer = Layer::new(features);
        layer.prdcer_lyr_id = producer_id.map(str::to_string);
        layer.next_page_token = token.map(str::to_string);
        layer
    }

    #[test]
    fn pages_accumulate_under_the_first_id() {
        let mut store = LayerStore::new();
        let first = store.ingest_page(page(Some("stores"), 3, Some("p2")));
        let second = store.ingest_page(page(Some("stores"), 2, None));

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        let layer = store.get(first).unwrap();
        assert_eq!(layer.features.len(), 5);
        assert_eq!(layer.next_page_token, None);
    }

    #[test]
    fn distinct_layers_get_distinct_ids() {
        let mut store = LayerStore::new();
        let a = store.ingest_page(page(Some("stores"), 1, None));
        let b = store.ingest_page(page(Some("competitors"), 1, None));
        let c = store.ingest_page(page(None, 1, None));
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(store.len(), 3);
        assert_eq!(store.find_by_producer_id("competitors").unwrap().id, b);
    }

    #[test]
    fn replace_requires_a_known_layer() {
        let mut store = LayerStore::new();
        let id = store.ingest_page(page(Some("stores"), 1, None));

        let mut updated = store.get(id).unwrap().clone();
        updated.is_grid = true;
        let previous = store.replace(updated).unwrap();
        assert!(!previous.is_grid);
        assert!(store.get(id).unwrap().is_grid);

        let stranger = page(None, 0, None);
        assert!(matches!(
            store.replace(stranger),
            Err(PipelineError::UnknownLayer { .. })
        ));
    }

    #[test]
    fn removing_frees_the_producer_id() {
        let mut store = LayerStore::new();
        let id = store.ingest_page(page(Some("stores"), 1, None));
        assert!(store.remove(id).is_some());
        assert!(store.is_empty());

        let again = store.ingest_page(page(Some("stores"), 1, None));
        assert_ne!(again, id);
    }
}

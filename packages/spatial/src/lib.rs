#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index over point features.
//!
//! Built fresh from a snapshot of a layer's features at the start of each
//! pipeline run and dropped with it; an index is never shared between
//! runs. Lookups are envelope searches, which for axis-aligned grid cells
//! are exact containment up to the cell edges.

use market_map_layer_models::{BoundingBox, Feature};
use rstar::{AABB, RTree, RTreeObject};

/// A feature position stored in the R-tree, pointing back into the
/// snapshot by index.
struct PointEntry {
    index: usize,
    position: [f64; 2],
}

impl RTreeObject for PointEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// R-tree over a snapshot of point features.
pub struct SpatialIndex {
    tree: RTree<PointEntry>,
    features: Vec<Feature>,
}

impl SpatialIndex {
    /// Builds an index over a copy of `features`.
    ///
    /// Features with non-finite coordinates are left out of the tree.
    #[must_use]
    pub fn build(features: &[Feature]) -> Self {
        let entries: Vec<PointEntry> = features
            .iter()
            .enumerate()
            .filter(|(_, f)| f.coordinates.is_finite())
            .map(|(index, f)| PointEntry {
                index,
                position: [f.coordinates.lng, f.coordinates.lat],
            })
            .collect();

        let skipped = features.len() - entries.len();
        if skipped > 0 {
            log::warn!("Left {skipped} features with non-finite coordinates out of the index");
        }

        let tree = RTree::bulk_load(entries);
        log::debug!("Indexed {} points", tree.size());

        Self {
            tree,
            features: features.to_vec(),
        }
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns `true` if nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns every feature whose position lies inside `bounds`, edges
    /// included, in the order the features were supplied to [`Self::build`].
    #[must_use]
    pub fn search(&self, bounds: &BoundingBox) -> Vec<&Feature> {
        if !bounds.is_valid() {
            return Vec::new();
        }

        let envelope =
            AABB::from_corners([bounds.west, bounds.south], [bounds.east, bounds.north]);

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();

        hits.into_iter().map(|i| &self.features[i]).collect()
    }
}

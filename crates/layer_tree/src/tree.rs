use std::collections::BTreeMap;
use std::sync::Arc;

use model::{Region, Size};
use picture_layer::{LayerTileCoordinator, TreeGeneration};
use tiles::{ContentSource, LayerId, TileStore};
use view::ScreenSpaceTransform;

/// Main-thread state of one layer, handed over at commit.
#[derive(Debug, Clone)]
pub struct LayerProperties {
    pub id: LayerId,
    pub bounds: Size,
    pub source: Arc<dyn ContentSource>,
    pub draws_content: bool,
    /// Layer-space area repainted since the previous commit.
    pub invalidation: Region,
    /// Layer space to page space, before page scale and device scale.
    pub transform: ScreenSpaceTransform,
    pub transform_is_animating: bool,
    /// Largest scale the running transform animation reaches, or 0 if unknown.
    pub maximum_animation_scale: f32,
}

impl LayerProperties {
    pub fn new(id: LayerId, bounds: Size, source: Arc<dyn ContentSource>) -> Self {
        Self {
            id,
            bounds,
            source,
            draws_content: true,
            invalidation: Region::new(),
            transform: ScreenSpaceTransform::identity(),
            transform_is_animating: false,
            maximum_animation_scale: 0.0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TreeLayer {
    pub(crate) coordinator: LayerTileCoordinator,
    pub(crate) transform: ScreenSpaceTransform,
    pub(crate) transform_is_animating: bool,
    pub(crate) maximum_animation_scale: f32,
}

impl TreeLayer {
    pub(crate) fn new(id: LayerId, source: Arc<dyn ContentSource>) -> Self {
        Self {
            coordinator: LayerTileCoordinator::new(id, source),
            transform: ScreenSpaceTransform::identity(),
            transform_is_animating: false,
            maximum_animation_scale: 0.0,
        }
    }

    pub(crate) fn apply(&mut self, properties: &LayerProperties) {
        let coordinator = &mut self.coordinator;
        coordinator.set_bounds(properties.bounds);
        coordinator.set_source(Arc::clone(&properties.source));
        coordinator.set_draws_content(properties.draws_content);
        coordinator.union_invalidation(&properties.invalidation);
        self.transform = properties.transform;
        self.transform_is_animating = properties.transform_is_animating;
        self.maximum_animation_scale = properties.maximum_animation_scale;
    }

    pub(crate) fn copy_placement_from(&mut self, other: &TreeLayer) {
        self.transform = other.transform;
        self.transform_is_animating = other.transform_is_animating;
        self.maximum_animation_scale = other.maximum_animation_scale;
    }
}

/// One generation of the layer tree, keyed by layer id.
#[derive(Debug)]
pub struct LayerTree {
    pub(crate) generation: TreeGeneration,
    pub(crate) source_frame_number: u64,
    pub(crate) layers: BTreeMap<LayerId, TreeLayer>,
    pub(crate) needs_update_draw_properties: bool,
}

impl LayerTree {
    pub(crate) fn new(generation: TreeGeneration) -> Self {
        Self {
            generation,
            source_frame_number: 0,
            layers: BTreeMap::new(),
            needs_update_draw_properties: true,
        }
    }

    pub fn generation(&self) -> TreeGeneration {
        self.generation
    }

    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerTileCoordinator> {
        self.layers.get(&id).map(|layer| &layer.coordinator)
    }

    pub fn layers(&self) -> impl Iterator<Item = &LayerTileCoordinator> + '_ {
        self.layers.values().map(|layer| &layer.coordinator)
    }

    pub(crate) fn remove_layer(&mut self, store: &mut TileStore, id: LayerId) {
        if let Some(mut layer) = self.layers.remove(&id) {
            layer.coordinator.release_resources(store);
        }
    }

    pub(crate) fn release_resources(&mut self, store: &mut TileStore) {
        for layer in self.layers.values_mut() {
            layer.coordinator.release_resources(store);
        }
    }
}

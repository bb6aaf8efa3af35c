use std::collections::HashSet;
use std::sync::Arc;

use model::Rect;
use picture_layer::{
    DrawCoverage, DrawProperties, LayerTileCoordinator, LayerTreeSettings, TreeContext,
    TreeGeneration,
};
use tiles::{LayerId, Occlusion, TileStore};
use view::{PageScaleController, ScreenSpaceTransform, ViewTransformError};

use crate::LayerTreeError;
use crate::tree::{LayerProperties, LayerTree, TreeLayer};

/// What the active tree drew this frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawFrame {
    pub source_frame_number: u64,
    pub layers: Vec<(LayerId, DrawCoverage)>,
    pub missing_tile_count: usize,
    pub incomplete_tile_count: usize,
}

/// Viewport and frame state shared by every tree.
#[derive(Debug, Clone, Copy)]
struct HostView {
    settings: LayerTreeSettings,
    device_viewport: Rect,
    viewport_for_tile_priority: Option<Rect>,
    device_scale_factor: f32,
    page_scale: PageScaleController,
    use_gpu_rasterization: bool,
    requires_high_res_to_draw: bool,
    frame_time_seconds: f64,
    begin_frame_interval_seconds: f64,
}

impl HostView {
    fn context(&self, tree: &LayerTree) -> TreeContext {
        let mut ctx = TreeContext::new(tree.generation, self.settings, self.device_viewport);
        ctx.frame_time_seconds = self.frame_time_seconds;
        ctx.begin_frame_interval_seconds = self.begin_frame_interval_seconds;
        ctx.viewport_for_tile_priority = self
            .viewport_for_tile_priority
            .unwrap_or(self.device_viewport);
        ctx.min_page_scale = self.page_scale.min_page_scale();
        ctx.pinch_gesture_active = self.page_scale.is_pinching();
        ctx.use_gpu_rasterization = self.use_gpu_rasterization;
        ctx.source_frame_number = tree.source_frame_number;
        ctx.needs_update_draw_properties = tree.needs_update_draw_properties;
        ctx.requires_high_res_to_draw = self.requires_high_res_to_draw;
        ctx
    }

    fn draw_properties(&self, layer: &TreeLayer) -> Result<DrawProperties, LayerTreeError> {
        let device = ScreenSpaceTransform::from_scale(self.device_scale_factor)?;
        let screen_space_transform = layer
            .transform
            .then(&self.page_scale.to_transform())?
            .then(&device)?;
        let coordinator = &layer.coordinator;
        let bounds = Rect::from_size(coordinator.bounds());
        let visible_content_rect = screen_space_transform
            .project_to_layer(self.device_viewport)
            .map(|visible| visible.intersect(bounds))
            .unwrap_or_default();

        let page_scale_factor = self.page_scale.page_scale();
        let maximum_animation_contents_scale = if layer.transform_is_animating {
            layer.maximum_animation_scale * page_scale_factor * self.device_scale_factor
        } else {
            0.0
        };
        Ok(DrawProperties {
            visible_content_rect,
            screen_space_transform,
            screen_space_transform_is_animating: layer.transform_is_animating,
            maximum_animation_contents_scale,
            ideal_contents_scale: screen_space_transform.max_scale_component(),
            page_scale_factor,
            device_scale_factor: self.device_scale_factor,
            is_drawn: coordinator.draws_content() && !bounds.is_empty(),
        })
    }
}

/// Owner of the tile store and the three tree generations.
#[derive(Debug)]
pub struct LayerTreeHost {
    view: HostView,
    store: TileStore,
    next_source_frame_number: u64,
    pending: Option<LayerTree>,
    active: LayerTree,
    recycle: Option<LayerTree>,
}

impl LayerTreeHost {
    pub fn new(settings: LayerTreeSettings, device_viewport: Rect) -> Result<Self, LayerTreeError> {
        settings.validate()?;
        if device_viewport.is_empty() {
            return Err(ViewTransformError::InvalidViewport.into());
        }
        Ok(Self {
            view: HostView {
                settings,
                device_viewport,
                viewport_for_tile_priority: None,
                device_scale_factor: 1.0,
                page_scale: PageScaleController::default(),
                use_gpu_rasterization: false,
                requires_high_res_to_draw: false,
                frame_time_seconds: 0.0,
                begin_frame_interval_seconds: 1.0 / 60.0,
            },
            store: TileStore::new(),
            next_source_frame_number: 1,
            pending: None,
            active: LayerTree::new(TreeGeneration::Active),
            recycle: None,
        })
    }

    pub fn settings(&self) -> &LayerTreeSettings {
        &self.view.settings
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TileStore {
        &mut self.store
    }

    pub fn pending_tree(&self) -> Option<&LayerTree> {
        self.pending.as_ref()
    }

    pub fn active_tree(&self) -> &LayerTree {
        &self.active
    }

    pub fn recycle_tree(&self) -> Option<&LayerTree> {
        self.recycle.as_ref()
    }

    /// Frame context for `tree` as of the last draw-property update.
    pub fn tree_context(&self, tree: &LayerTree) -> TreeContext {
        self.view.context(tree)
    }

    pub fn page_scale(&self) -> &PageScaleController {
        &self.view.page_scale
    }

    pub fn page_scale_mut(&mut self) -> &mut PageScaleController {
        &mut self.view.page_scale
    }

    pub fn set_page_scale_limits(
        &mut self,
        min_page_scale: f32,
        max_page_scale: f32,
    ) -> Result<(), LayerTreeError> {
        let mut page_scale = PageScaleController::new(min_page_scale, max_page_scale)?;
        page_scale.set_page_scale(self.view.page_scale.page_scale())?;
        self.view.page_scale = page_scale;
        Ok(())
    }

    pub fn set_device_viewport(&mut self, device_viewport: Rect) -> Result<(), LayerTreeError> {
        if device_viewport.is_empty() {
            return Err(ViewTransformError::InvalidViewport.into());
        }
        self.view.device_viewport = device_viewport;
        Ok(())
    }

    /// Overrides the rect tile priorities are computed against.
    pub fn set_viewport_for_tile_priority(&mut self, viewport: Option<Rect>) {
        self.view.viewport_for_tile_priority = viewport;
    }

    pub fn set_device_scale_factor(&mut self, device_scale_factor: f32) -> Result<(), LayerTreeError> {
        if !device_scale_factor.is_finite() || device_scale_factor <= 0.0 {
            return Err(ViewTransformError::InvalidZoom.into());
        }
        self.view.device_scale_factor = device_scale_factor;
        Ok(())
    }

    pub fn set_use_gpu_rasterization(&mut self, use_gpu_rasterization: bool) {
        self.view.use_gpu_rasterization = use_gpu_rasterization;
    }

    pub fn set_requires_high_res_to_draw(&mut self, requires_high_res_to_draw: bool) {
        self.view.requires_high_res_to_draw = requires_high_res_to_draw;
    }

    pub fn set_begin_frame_interval(&mut self, seconds: f64) {
        self.view.begin_frame_interval_seconds = seconds;
    }

    /// Builds the pending tree from main-thread layer state, reusing the
    /// recycle tree when there is one. Returns the new source frame number.
    pub fn commit(&mut self, layers: &[LayerProperties]) -> Result<u64, LayerTreeError> {
        if let Some(pending) = &self.pending {
            return Err(LayerTreeError::PendingTreeNotActivated {
                source_frame_number: pending.source_frame_number,
            });
        }
        let mut committed = HashSet::with_capacity(layers.len());
        for properties in layers {
            if !committed.insert(properties.id) {
                return Err(LayerTreeError::DuplicateLayer {
                    layer_id: properties.id,
                });
            }
        }

        let mut tree = self
            .recycle
            .take()
            .unwrap_or_else(|| LayerTree::new(TreeGeneration::Pending));
        tree.generation = TreeGeneration::Pending;
        tree.source_frame_number = self.next_source_frame_number;
        tree.needs_update_draw_properties = true;
        self.next_source_frame_number += 1;

        let stale: Vec<LayerId> = tree
            .layers
            .keys()
            .copied()
            .filter(|id| !committed.contains(id))
            .collect();
        for id in stale {
            tree.remove_layer(&mut self.store, id);
        }
        for properties in layers {
            tree.layers
                .entry(properties.id)
                .or_insert_with(|| TreeLayer::new(properties.id, Arc::clone(&properties.source)))
                .apply(properties);
        }

        log::debug!(
            target: "layer_tree",
            "committed frame {} with {} layers",
            tree.source_frame_number,
            tree.layers.len()
        );
        let source_frame_number = tree.source_frame_number;
        self.pending = Some(tree);
        Ok(source_frame_number)
    }

    /// Derives draw properties and updates tiles on the pending tree, then on
    /// the active tree. Tilings one tree adds are mirrored onto the twin.
    pub fn update_draw_properties(&mut self, frame_time_seconds: f64) -> Result<(), LayerTreeError> {
        self.view.frame_time_seconds = frame_time_seconds;
        self.active.needs_update_draw_properties = true;
        let occlusion = Occlusion::none();

        if let Some(pending) = self.pending.as_mut() {
            pending.needs_update_draw_properties = true;
            for layer in pending.layers.values_mut() {
                let properties = self.view.draw_properties(layer)?;
                layer.coordinator.set_draw_properties(properties);
            }
            let ctx = self.view.context(pending);
            let mut added = Vec::new();
            for (id, layer) in pending.layers.iter_mut() {
                let twin = self.active.layers.get(id).map(|twin| &twin.coordinator);
                let scales = layer
                    .coordinator
                    .update_tiles(&mut self.store, &ctx, twin, &occlusion);
                if !scales.is_empty() {
                    added.push((*id, scales));
                }
            }
            pending.needs_update_draw_properties = false;

            let active_ctx = self.view.context(&self.active);
            for (id, scales) in added {
                sync_added_tilings(&mut self.store, &active_ctx, &mut self.active, pending, id, &scales);
            }
        }

        for layer in self.active.layers.values_mut() {
            let properties = self.view.draw_properties(layer)?;
            layer.coordinator.set_draw_properties(properties);
        }
        let ctx = self.view.context(&self.active);
        let mut added = Vec::new();
        for (id, layer) in self.active.layers.iter_mut() {
            let twin = self
                .pending
                .as_ref()
                .and_then(|pending| pending.layers.get(id))
                .map(|twin| &twin.coordinator);
            let scales = layer
                .coordinator
                .update_tiles(&mut self.store, &ctx, twin, &occlusion);
            if !scales.is_empty() {
                added.push((*id, scales));
            }
        }
        self.active.needs_update_draw_properties = false;

        if let Some(pending) = self.pending.as_mut() {
            let pending_ctx = self.view.context(pending);
            for (id, scales) in added {
                sync_added_tilings(&mut self.store, &pending_ctx, pending, &self.active, id, &scales);
            }
        }
        Ok(())
    }

    /// Fails with the first pending layer whose required tiles are not ready.
    pub fn check_ready_to_activate(&self) -> Result<(), LayerTreeError> {
        let pending = self.pending.as_ref().ok_or(LayerTreeError::NoPendingTree)?;
        let ctx = self.view.context(pending);
        for (id, layer) in &pending.layers {
            if !layer
                .coordinator
                .all_tiles_required_for_activation_are_ready_to_draw(&self.store, &ctx)
            {
                return Err(LayerTreeError::ActivationBlocked { layer_id: *id });
            }
        }
        Ok(())
    }

    /// Promotes the pending tree. The previous active tilings end up in the
    /// recycle tree with their active priorities reset.
    pub fn activate(&mut self) -> Result<u64, LayerTreeError> {
        self.check_ready_to_activate()?;
        let Some(mut pending) = self.pending.take() else {
            return Err(LayerTreeError::NoPendingTree);
        };
        let ctx = self.view.context(&pending);

        let dropped: Vec<LayerId> = self
            .active
            .layers
            .keys()
            .copied()
            .filter(|id| !pending.layers.contains_key(id))
            .collect();
        for id in dropped {
            self.active.remove_layer(&mut self.store, id);
        }

        for (id, layer) in pending.layers.iter_mut() {
            let active_layer = self
                .active
                .layers
                .entry(*id)
                .or_insert_with(|| TreeLayer::new(*id, Arc::clone(layer.coordinator.source())));
            layer
                .coordinator
                .push_properties_to(&mut self.store, &ctx, &mut active_layer.coordinator);
            active_layer.copy_placement_from(layer);
            active_layer.coordinator.did_become_active(&mut self.store);
        }

        self.active.source_frame_number = pending.source_frame_number;
        self.active.needs_update_draw_properties = true;
        pending.generation = TreeGeneration::Recycle;
        log::debug!(
            target: "layer_tree",
            "activated frame {} ({} resident tiles)",
            self.active.source_frame_number,
            self.store.resident_count()
        );
        self.recycle = Some(pending);
        Ok(self.active.source_frame_number)
    }

    /// Draw coverage of every drawn active layer, followed by tiling cleanup.
    pub fn draw_active_tree(&mut self) -> DrawFrame {
        let ctx = self.view.context(&self.active);
        let mut frame = DrawFrame {
            source_frame_number: self.active.source_frame_number,
            ..DrawFrame::default()
        };
        for (id, layer) in self.active.layers.iter_mut() {
            if !layer.coordinator.draw_properties().is_drawn {
                continue;
            }
            let coverage = layer.coordinator.append_draw_coverage(&self.store, &ctx);
            let twin = self
                .pending
                .as_ref()
                .and_then(|pending| pending.layers.get(id))
                .map(|twin| &twin.coordinator);
            let outcome = layer.coordinator.clean_up_tilings_on_active_layer(
                &mut self.store,
                &ctx,
                &coverage.tilings_used,
                twin,
            );
            if let Some(twin) = self.pending.as_mut().and_then(|pending| pending.layers.get_mut(id)) {
                for scale in &outcome.remove_from_twin {
                    twin.coordinator.remove_tiling(&mut self.store, *scale);
                }
            }
            if let Some(recycled) = self.recycle.as_mut().and_then(|recycle| recycle.layers.get_mut(id)) {
                for scale in &outcome.removed {
                    recycled.coordinator.remove_tiling(&mut self.store, *scale);
                }
            }

            frame.missing_tile_count += coverage.missing_tile_count;
            frame.incomplete_tile_count += coverage.incomplete_tile_count;
            frame.layers.push((*id, coverage));
        }
        if frame.missing_tile_count > 0 {
            log::debug!(
                target: "layer_tree",
                "frame {} checkerboarded {} tiles",
                frame.source_frame_number,
                frame.missing_tile_count
            );
        }
        frame
    }

    /// Drops every tiling of every tree, for memory pressure or visibility loss.
    pub fn release_resources(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.release_resources(&mut self.store);
        }
        self.active.release_resources(&mut self.store);
        if let Some(recycle) = self.recycle.as_mut() {
            recycle.release_resources(&mut self.store);
        }
        log::debug!(target: "layer_tree", "released all tile resources");
    }
}

fn sync_added_tilings(
    store: &mut TileStore,
    ctx: &TreeContext,
    target: &mut LayerTree,
    source: &LayerTree,
    id: LayerId,
    scales: &[f32],
) {
    let (Some(target_layer), Some(source_layer)) = (target.layers.get_mut(&id), source.layers.get(&id))
    else {
        return;
    };
    let twin: &LayerTileCoordinator = &source_layer.coordinator;
    for scale in scales {
        target_layer
            .coordinator
            .sync_tiling(store, ctx, *scale, Some(twin));
    }
}

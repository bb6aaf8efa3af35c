use std::mem;
use std::sync::Arc;

use model::{Rect, Region, Size};
use tiles::{
    ContentSource, LayerId, Occlusion, TileKey, TileResolution, TileSizePolicy, TileStore,
    Tiling, TilingClient, TilingSet, WhichTree,
};

use crate::context::{DrawProperties, TreeContext, TreeGeneration};

const MAX_SCALE_RATIO_DURING_PINCH: f32 = 2.0;
const SNAP_TO_EXISTING_TILING_RATIO: f32 = 1.2;
const CPU_SKEWPORT_TARGET_TIME_IN_FRAMES: f64 = 60.0;
const GPU_SKEWPORT_TARGET_TIME_IN_FRAMES: f64 = 0.0;

/// Page, device and source parts of a contents scale, plus their product.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScaleComponents {
    pub page: f32,
    pub device: f32,
    pub source: f32,
    pub contents: f32,
}

/// Tilings to create and the scales that end up tagged HIGH and LOW.
#[derive(Debug, Clone, PartialEq)]
pub struct TilingPlan {
    pub create: Vec<f32>,
    pub high_res_scale: f32,
    pub low_res_scale: Option<f32>,
}

/// Computes the tilings needed for the given raster scales without touching
/// the set. Every tiling not named by the plan ends up NON_IDEAL.
pub fn plan_tilings_for_raster_scale(
    tilings: &TilingSet,
    raster_contents_scale: f32,
    low_res_raster_contents_scale: f32,
    allow_new_low_res: bool,
) -> TilingPlan {
    let exists = |scale: f32| tilings.tiling_at_scale(scale).is_some();
    let mut create = Vec::new();
    let mut low_res_scale =
        exists(low_res_raster_contents_scale).then_some(low_res_raster_contents_scale);

    if !exists(raster_contents_scale) {
        create.push(raster_contents_scale);
        if raster_contents_scale == low_res_raster_contents_scale {
            low_res_scale = Some(raster_contents_scale);
        }
    }

    // New low res tilings only while the transform is static.
    if allow_new_low_res && low_res_scale.is_none() {
        create.push(low_res_raster_contents_scale);
        low_res_scale = Some(low_res_raster_contents_scale);
    }

    if low_res_scale.is_none() {
        low_res_scale = tilings
            .find_tiling_with_resolution(TileResolution::Low)
            .map(Tiling::contents_scale);
    }

    TilingPlan {
        create,
        high_res_scale: raster_contents_scale,
        low_res_scale: low_res_scale.filter(|scale| *scale != raster_contents_scale),
    }
}

/// Tilings dropped by an active-layer cleanup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanUpOutcome {
    /// Removed here; the recycle twin drops them too, whatever their tag.
    pub removed: Vec<f32>,
    /// Scales the pending twin holds as NON_IDEAL and should drop as well.
    pub remove_from_twin: Vec<f32>,
}

/// One piece of the visible rect, in the space of the largest tiling scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawEntry {
    pub geometry_rect: Rect,
    /// `None` where nothing is ready yet and the area is checkerboarded.
    pub tile: Option<TileKey>,
    pub contents_scale: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawCoverage {
    pub contents_scale: f32,
    pub solid_color: Option<u32>,
    pub entries: Vec<DrawEntry>,
    /// Uncovered pieces inside the viewport for tile priority.
    pub missing_tile_count: usize,
    /// Pieces drawn from a tiling other than the high res one.
    pub incomplete_tile_count: usize,
    pub tilings_used: Vec<f32>,
}

/// Per-layer controller for the tiling pyramid of one picture layer in one
/// tree generation.
///
/// The twin (same layer id in the sibling tree) is never stored. Operations
/// that need it take it as an argument, and operations that would mutate it
/// return what the caller has to apply.
#[derive(Debug)]
pub struct LayerTileCoordinator {
    id: LayerId,
    bounds: Size,
    draws_content: bool,
    source: Arc<dyn ContentSource>,
    tilings: TilingSet,
    invalidation: Region,
    draw_properties: DrawProperties,
    ideal: ScaleComponents,
    raster: ScaleComponents,
    low_res_raster_contents_scale: f32,
    raster_source_scale_is_fixed: bool,
    was_screen_space_transform_animating: bool,
    needs_post_commit_initialization: bool,
    should_update_tile_priorities: bool,
    visible_rect_for_tile_priority: Rect,
    viewport_rect_for_tile_priority: Rect,
    screen_space_transform_for_tile_priority: view::ScreenSpaceTransform,
}

impl LayerTileCoordinator {
    pub fn new(id: LayerId, source: Arc<dyn ContentSource>) -> Self {
        Self {
            id,
            bounds: Size::default(),
            draws_content: true,
            source,
            tilings: TilingSet::default(),
            invalidation: Region::new(),
            draw_properties: DrawProperties::default(),
            ideal: ScaleComponents::default(),
            raster: ScaleComponents::default(),
            low_res_raster_contents_scale: 0.0,
            raster_source_scale_is_fixed: false,
            was_screen_space_transform_animating: false,
            needs_post_commit_initialization: true,
            should_update_tile_priorities: false,
            visible_rect_for_tile_priority: Rect::default(),
            viewport_rect_for_tile_priority: Rect::default(),
            screen_space_transform_for_tile_priority: view::ScreenSpaceTransform::identity(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn bounds(&self) -> Size {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Size) {
        self.bounds = bounds;
    }

    pub fn draws_content(&self) -> bool {
        self.draws_content
    }

    pub fn set_draws_content(&mut self, draws_content: bool) {
        self.draws_content = draws_content;
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    pub fn set_source(&mut self, source: Arc<dyn ContentSource>) {
        self.source = source;
    }

    pub fn tilings(&self) -> &TilingSet {
        &self.tilings
    }

    pub fn invalidation(&self) -> &Region {
        &self.invalidation
    }

    /// Accumulates a layer-space invalidation until the next push.
    pub fn union_invalidation(&mut self, region: &Region) {
        self.invalidation.union(region);
    }

    pub fn draw_properties(&self) -> &DrawProperties {
        &self.draw_properties
    }

    pub fn set_draw_properties(&mut self, draw_properties: DrawProperties) {
        self.draw_properties = draw_properties;
    }

    pub fn ideal_scales(&self) -> ScaleComponents {
        self.ideal
    }

    pub fn raster_scales(&self) -> ScaleComponents {
        self.raster
    }

    pub fn ideal_contents_scale(&self) -> f32 {
        self.ideal.contents
    }

    pub fn raster_contents_scale(&self) -> f32 {
        self.raster.contents
    }

    pub fn low_res_raster_contents_scale(&self) -> f32 {
        self.low_res_raster_contents_scale
    }

    pub fn raster_source_scale_is_fixed(&self) -> bool {
        self.raster_source_scale_is_fixed
    }

    pub fn needs_post_commit_initialization(&self) -> bool {
        self.needs_post_commit_initialization
    }

    pub fn can_have_tilings(&self) -> bool {
        !self.source.is_solid_color() && self.draws_content && self.source.has_recordings()
    }

    pub fn can_have_tiling_with_scale(&self, ctx: &TreeContext, contents_scale: f32) -> bool {
        self.can_have_tilings() && contents_scale >= self.minimum_contents_scale(ctx)
    }

    /// Never less than one content pixel along the smaller dimension.
    pub fn minimum_contents_scale(&self, ctx: &TreeContext) -> f32 {
        let setting_min = ctx.settings.minimum_contents_scale;
        let min_dimension = self.bounds.width.min(self.bounds.height);
        if min_dimension <= 0 {
            return setting_min;
        }
        (1.0 / min_dimension as f32).max(setting_min)
    }

    pub fn maximum_tiling_contents_scale(&self, ctx: &TreeContext) -> f32 {
        self.tilings
            .tilings()
            .iter()
            .map(Tiling::contents_scale)
            .fold(self.minimum_contents_scale(ctx), f32::max)
    }

    pub fn has_valid_tile_priorities(&self, ctx: &TreeContext) -> bool {
        ctx.generation != TreeGeneration::Recycle && self.draw_properties.is_drawn
    }

    pub fn tile_size_policy(&self, ctx: &TreeContext) -> TileSizePolicy {
        TileSizePolicy {
            default_tile_size: ctx.settings.default_tile_size,
            max_untiled_layer_size: ctx.settings.max_untiled_layer_size,
            max_texture_size: ctx.settings.max_texture_size,
            is_mask: self.source.is_mask(),
            gpu_raster_viewport: ctx
                .use_gpu_rasterization
                .then(|| ctx.device_viewport.size()),
        }
    }

    pub fn calculate_tile_size(&self, ctx: &TreeContext, content_bounds: Size) -> Size {
        self.tile_size_policy(ctx).tile_size(content_bounds)
    }

    /// Per-frame entry point. Returns the scales of tilings created here so
    /// the caller can mirror them onto the twin with [`Self::sync_tiling`].
    pub fn update_tiles(
        &mut self,
        store: &mut TileStore,
        ctx: &TreeContext,
        twin: Option<&LayerTileCoordinator>,
        occlusion: &Occlusion,
    ) -> Vec<f32> {
        self.do_post_commit_initialization_if_needed(store, ctx, twin);

        self.visible_rect_for_tile_priority = self.draw_properties.visible_content_rect;
        self.viewport_rect_for_tile_priority = ctx.viewport_for_tile_priority;
        self.screen_space_transform_for_tile_priority = self.draw_properties.screen_space_transform;

        if !self.can_have_tilings() {
            self.ideal = ScaleComponents::default();
            debug_assert!(self.tilings.is_empty() || ctx.generation == TreeGeneration::Recycle);
            return Vec::new();
        }

        self.update_ideal_scales(ctx);

        debug_assert!(
            !self.tilings.is_empty() || self.raster.contents == 0.0,
            "layer {:?} without tilings has raster scales",
            self.id
        );
        let mut added = Vec::new();
        if self.raster.contents == 0.0 || self.should_adjust_raster_scale(ctx) {
            self.recalculate_raster_scales(ctx);
            added = self.add_tilings_for_raster_scale(ctx);
        }

        self.was_screen_space_transform_animating =
            self.draw_properties.screen_space_transform_is_animating;
        self.should_update_tile_priorities = true;

        self.update_tile_priorities(store, ctx, twin, occlusion);

        if ctx.is_pending() {
            self.mark_visible_resources_as_required(store, ctx, twin);
        }
        added
    }

    pub fn update_tile_priorities(
        &mut self,
        store: &mut TileStore,
        ctx: &TreeContext,
        twin: Option<&LayerTileCoordinator>,
        occlusion: &Occlusion,
    ) {
        let Some(tree) = ctx.generation.which_tree() else {
            return;
        };
        if !self.tilings.needs_update_for_frame_at_time(ctx.frame_time_seconds) {
            return;
        }

        let viewport = self.viewport_for_tile_priority_in_content_space(ctx);
        let pending_invalidation = match tree {
            WhichTree::Pending => Some(&self.invalidation),
            WhichTree::Active => twin.map(|twin| &twin.invalidation),
        };
        let client = tiling_client(
            self.id,
            self.source.as_ref(),
            ctx,
            pending_invalidation,
            twin.map(|twin| &twin.tilings),
        );
        self.tilings.update_tile_priorities(
            store,
            &client,
            tree,
            viewport,
            self.ideal.contents,
            ctx.frame_time_seconds,
            occlusion,
        );
    }

    /// The visible rect, or the priority viewport projected into layer space
    /// when nothing is visible or the priority viewport is overridden.
    pub fn viewport_for_tile_priority_in_content_space(&self, ctx: &TreeContext) -> Rect {
        let visible = self.visible_rect_for_tile_priority;
        if !visible.is_empty() && ctx.device_viewport == self.viewport_rect_for_tile_priority {
            return visible;
        }
        self.screen_space_transform_for_tile_priority
            .project_to_layer(self.viewport_rect_for_tile_priority)
            .unwrap_or(visible)
    }

    pub fn update_ideal_scales(&mut self, ctx: &TreeContext) {
        debug_assert!(self.can_have_tilings());
        let min_contents_scale = self.minimum_contents_scale(ctx);
        let min_page_scale = ctx.min_page_scale;
        debug_assert!(min_page_scale > 0.0, "min page scale must be positive");
        let min_device_scale = 1.0;
        let min_source_scale = min_contents_scale / min_page_scale / min_device_scale;

        let properties = &self.draw_properties;
        let ideal_source_scale = properties.ideal_contents_scale
            / properties.page_scale_factor
            / properties.device_scale_factor;
        self.ideal = ScaleComponents {
            page: properties.page_scale_factor,
            device: properties.device_scale_factor,
            source: ideal_source_scale.max(min_source_scale),
            contents: properties.ideal_contents_scale.max(min_contents_scale),
        };
    }

    fn should_adjust_raster_scale_during_scale_animations(&self, ctx: &TreeContext) -> bool {
        // Re-rastering text at every animation step is too costly on GPU.
        ctx.use_gpu_rasterization && !self.source.has_text()
    }

    pub fn should_adjust_raster_scale(&self, ctx: &TreeContext) -> bool {
        let animating = self.draw_properties.screen_space_transform_is_animating;
        if self.was_screen_space_transform_animating != animating {
            return true;
        }
        if animating
            && self.raster.contents != self.ideal.contents
            && self.should_adjust_raster_scale_during_scale_animations(ctx)
        {
            return true;
        }

        let is_pinching = ctx.pinch_gesture_active;
        if is_pinching && self.raster.page != 0.0 {
            let ratio = self.ideal.page / self.raster.page;
            if self.raster.page > self.ideal.page || ratio > MAX_SCALE_RATIO_DURING_PINCH {
                return true;
            }
        }
        if !is_pinching && self.raster.page != self.ideal.page {
            return true;
        }
        if self.raster.device != self.ideal.device {
            return true;
        }
        !animating && !self.raster_source_scale_is_fixed && self.raster.source != self.ideal.source
    }

    /// Snaps to an existing tiling within the snapping ratio, closest first.
    pub fn snapped_contents_scale(&self, scale: f32) -> f32 {
        let mut snapped_scale = scale;
        let mut snapped_ratio = SNAP_TO_EXISTING_TILING_RATIO;
        for tiling in self.tilings.tilings() {
            let ratio = positive_ratio(tiling.contents_scale(), scale);
            if ratio < snapped_ratio {
                snapped_scale = tiling.contents_scale();
                snapped_ratio = ratio;
            }
        }
        snapped_scale
    }

    pub fn recalculate_raster_scales(&mut self, ctx: &TreeContext) {
        let old_raster_contents_scale = self.raster.contents;
        let old_raster_page_scale = self.raster.page;
        let old_raster_source_scale = self.raster.source;
        let animating = self.draw_properties.screen_space_transform_is_animating;

        self.raster = self.ideal;

        // A source scale change outside an animation boundary is unpredictable;
        // once fixed the source scale stays fixed for the life of the layer.
        if old_raster_source_scale != 0.0
            && !animating
            && !self.was_screen_space_transform_animating
            && old_raster_source_scale != self.ideal.source
        {
            self.raster_source_scale_is_fixed = true;
        }
        if self.raster_source_scale_is_fixed {
            self.raster.contents /= self.raster.source;
            self.raster.source = 1.0;
        }

        // While pinching, step from the previous scale instead of following ideal.
        if ctx.pinch_gesture_active && old_raster_contents_scale != 0.0 {
            let zooming_out = old_raster_page_scale > self.ideal.page;
            let desired_contents_scale = if zooming_out {
                old_raster_contents_scale / MAX_SCALE_RATIO_DURING_PINCH
            } else {
                old_raster_contents_scale * MAX_SCALE_RATIO_DURING_PINCH
            };
            self.raster.contents = self.snapped_contents_scale(desired_contents_scale);
            self.raster.page = self.raster.contents / self.raster.device / self.raster.source;
        }

        self.raster.contents = self.raster.contents.max(self.minimum_contents_scale(ctx));

        if animating && !self.should_adjust_raster_scale_during_scale_animations(ctx) {
            let maximum_animation_scale = self.draw_properties.maximum_animation_contents_scale;
            let can_raster_at_maximum_scale = maximum_animation_scale > 0.0
                && self.bounds.scale_to_ceiled(maximum_animation_scale).area()
                    <= ctx.device_viewport.size().area();
            let floor = if can_raster_at_maximum_scale {
                maximum_animation_scale
            } else {
                self.ideal.page * self.ideal.device
            };
            self.raster.contents = self.raster.contents.max(floor);
        }

        let content_bounds = self.bounds.scale_to_ceiled(self.raster.contents);
        let tile_size = self.calculate_tile_size(ctx, content_bounds);
        let tile_covers_bounds =
            tile_size.width >= content_bounds.width && tile_size.height >= content_bounds.height;
        self.low_res_raster_contents_scale = if tile_size.is_empty() || tile_covers_bounds {
            self.raster.contents
        } else {
            (self.raster.contents * ctx.settings.low_res_contents_scale_factor)
                .max(self.minimum_contents_scale(ctx))
        };

        log::debug!(
            target: "picture_layer",
            "layer {:?} raster scale {} (low res {}, ideal {})",
            self.id,
            self.raster.contents,
            self.low_res_raster_contents_scale,
            self.ideal.contents
        );
    }

    /// Creates the HIGH (and, when allowed, LOW) tiling for the current raster
    /// scales and retags the set. Returns the scales of created tilings.
    pub fn add_tilings_for_raster_scale(&mut self, ctx: &TreeContext) -> Vec<f32> {
        let allow_new_low_res = ctx.settings.create_low_res_tiling
            && !ctx.pinch_gesture_active
            && !self.draw_properties.screen_space_transform_is_animating;
        let plan = plan_tilings_for_raster_scale(
            &self.tilings,
            self.raster.contents,
            self.low_res_raster_contents_scale,
            allow_new_low_res,
        );

        let mut added = Vec::with_capacity(plan.create.len());
        for scale in &plan.create {
            if self.add_tiling(ctx, *scale) {
                added.push(*scale);
            }
        }

        for position in 0..self.tilings.num_tilings() {
            let tiling = self.tilings.tiling_at_mut(position);
            let scale = tiling.contents_scale();
            let resolution = if scale == plan.high_res_scale {
                TileResolution::High
            } else if plan.low_res_scale == Some(scale) {
                TileResolution::Low
            } else {
                TileResolution::NonIdeal
            };
            tiling.set_resolution(resolution);
        }
        self.sanity_check_tiling_state(ctx);
        added
    }

    fn add_tiling(&mut self, ctx: &TreeContext, contents_scale: f32) -> bool {
        debug_assert!(
            self.can_have_tiling_with_scale(ctx, contents_scale),
            "layer {:?} cannot have a tiling at scale {contents_scale}",
            self.id
        );
        let tile_size = self.calculate_tile_size(ctx, self.bounds.scale_to_ceiled(contents_scale));
        let minimum_contents_scale = self.minimum_contents_scale(ctx);
        self.tilings
            .add_tiling(contents_scale, tile_size, minimum_contents_scale)
            .is_some()
    }

    pub fn remove_tiling(&mut self, store: &mut TileStore, contents_scale: f32) {
        if self.tilings.is_empty() {
            return;
        }
        self.tilings.remove_tiling(store, contents_scale);
        if self.tilings.is_empty() {
            self.reset_raster_scale();
        }
    }

    /// Leaves the layer in the same state as one without drawable content.
    pub fn remove_all_tilings(&mut self, store: &mut TileStore) {
        self.tilings.remove_all_tilings(store);
        self.reset_raster_scale();
    }

    fn reset_raster_scale(&mut self) {
        self.raster = ScaleComponents::default();
        self.low_res_raster_contents_scale = 0.0;
        self.raster_source_scale_is_fixed = false;
        // Priorities wait for the next draw-property update.
        self.should_update_tile_priorities = false;
    }

    fn sanity_check_tiling_state(&self, ctx: &TreeContext) {
        if ctx.generation == TreeGeneration::Recycle {
            return;
        }
        if !self.can_have_tilings() {
            debug_assert!(self.tilings.is_empty());
            return;
        }
        if self.tilings.is_empty() {
            return;
        }
        debug_assert_eq!(
            self.tilings.num_high_res_tilings(),
            1,
            "layer {:?} must have exactly one high res tiling",
            self.id
        );
    }

    /// Drops active-tree tilings whose scale no longer brackets the raster and
    /// ideal scales of this layer or its twin, keeping low res tilings and
    /// anything drawn this frame.
    pub fn clean_up_tilings_on_active_layer(
        &mut self,
        store: &mut TileStore,
        ctx: &TreeContext,
        used_tilings: &[f32],
        twin: Option<&LayerTileCoordinator>,
    ) -> CleanUpOutcome {
        debug_assert!(ctx.is_active());
        let mut outcome = CleanUpOutcome::default();
        if self.tilings.is_empty() {
            return outcome;
        }

        let mut min_acceptable_scale = self.raster.contents.min(self.ideal.contents);
        let mut max_acceptable_scale = self.raster.contents.max(self.ideal.contents);
        let mut twin_low_res_scale = 0.0;
        if let Some(twin) = twin.filter(|twin| twin.can_have_tilings()) {
            min_acceptable_scale =
                min_acceptable_scale.min(twin.raster.contents.min(twin.ideal.contents));
            max_acceptable_scale =
                max_acceptable_scale.max(twin.raster.contents.max(twin.ideal.contents));
            if let Some(low_res) = twin.tilings.find_tiling_with_resolution(TileResolution::Low) {
                twin_low_res_scale = low_res.contents_scale();
            }
        }

        let to_remove: Vec<f32> = self
            .tilings
            .tilings()
            .iter()
            .filter(|tiling| {
                let scale = tiling.contents_scale();
                if scale >= min_acceptable_scale && scale <= max_acceptable_scale {
                    return false;
                }
                if ctx.settings.create_low_res_tiling
                    && (tiling.resolution() == TileResolution::Low || scale == twin_low_res_scale)
                {
                    return false;
                }
                !used_tilings.contains(&scale)
            })
            .map(Tiling::contents_scale)
            .collect();

        for scale in to_remove {
            if let Some(twin_tiling) = twin.and_then(|twin| twin.tilings.tiling_at_scale(scale)) {
                if twin_tiling.resolution() == TileResolution::NonIdeal {
                    outcome.remove_from_twin.push(scale);
                }
            }
            if let Some(tiling) = self.tilings.tiling_at_scale(scale) {
                assert_ne!(
                    tiling.resolution(),
                    TileResolution::High,
                    "cleanup must never remove the high res tiling"
                );
            }
            self.tilings.remove_tiling(store, scale);
            outcome.removed.push(scale);
        }

        if !outcome.removed.is_empty() {
            log::debug!(
                target: "picture_layer",
                "layer {:?} dropped tilings {:?}",
                self.id,
                outcome.removed
            );
        }
        outcome
    }

    /// Copies raster scales and tilings from the active twin. Falls back to a
    /// full raster-scale reset when the twin's high res tiling cannot be kept.
    pub fn sync_from_active_layer(
        &mut self,
        store: &mut TileStore,
        ctx: &TreeContext,
        other: &LayerTileCoordinator,
    ) {
        debug_assert!(!other.needs_post_commit_initialization);
        if !self.draws_content {
            self.remove_all_tilings(store);
            return;
        }

        self.raster = other.raster;
        self.low_res_raster_contents_scale = other.low_res_raster_contents_scale;

        let synced_high_res_tiling = if self.can_have_tilings() {
            let policy = self.tile_size_policy(ctx);
            let minimum_contents_scale = self.minimum_contents_scale(ctx);
            let client = tiling_client(
                self.id,
                self.source.as_ref(),
                ctx,
                Some(&self.invalidation),
                Some(&other.tilings),
            );
            self.tilings.sync_tilings(
                store,
                &client,
                &other.tilings,
                self.bounds,
                &self.invalidation,
                minimum_contents_scale,
                |content_bounds| policy.tile_size(content_bounds),
            )
        } else {
            self.remove_all_tilings(store);
            false
        };

        if synced_high_res_tiling {
            self.sanity_check_tiling_state(ctx);
        } else {
            log::debug!(
                target: "picture_layer",
                "layer {:?} could not keep the twin's high res tiling; raster scale reset",
                self.id
            );
            self.reset_raster_scale();
        }
    }

    /// Mirrors a tiling the twin just created.
    pub fn sync_tiling(
        &mut self,
        store: &mut TileStore,
        ctx: &TreeContext,
        contents_scale: f32,
        twin: Option<&LayerTileCoordinator>,
    ) {
        if !self.can_have_tiling_with_scale(ctx, contents_scale) {
            return;
        }
        if !self.add_tiling(ctx, contents_scale) {
            return;
        }
        // With stale draw properties the tiling is picked up by the next update.
        if !ctx.needs_update_draw_properties && self.should_update_tile_priorities {
            self.update_tile_priorities(store, ctx, twin, &Occlusion::none());
        }
    }

    pub fn do_post_commit_initialization_if_needed(
        &mut self,
        store: &mut TileStore,
        ctx: &TreeContext,
        active_twin: Option<&LayerTileCoordinator>,
    ) {
        if !self.needs_post_commit_initialization || !ctx.is_pending() {
            return;
        }
        match active_twin.filter(|twin| !twin.needs_post_commit_initialization) {
            Some(twin) => self.sync_from_active_layer(store, ctx, twin),
            None => {
                if self.tilings.layer_bounds() != self.bounds {
                    self.remove_all_tilings(store);
                    self.tilings = TilingSet::new(self.bounds);
                } else {
                    self.tilings.remove_tiles_in_region(store, &self.invalidation);
                }
            }
        }
        self.needs_post_commit_initialization = false;
    }

    /// Marks the smallest set of visible tiles that must be ready before the
    /// pending tree can activate without flashing lower resolution content.
    pub fn mark_visible_resources_as_required(
        &self,
        store: &mut TileStore,
        ctx: &TreeContext,
        twin: Option<&LayerTileCoordinator>,
    ) {
        debug_assert!(ctx.is_pending());
        let visible = self.draw_properties.visible_content_rect;
        if visible.is_empty() || self.tilings.is_empty() {
            return;
        }
        let rect = self
            .viewport_for_tile_priority_in_content_space(ctx)
            .intersect(visible);

        let mut min_acceptable_scale = self.raster.contents.min(self.ideal.contents);
        if let Some(twin) = twin {
            let twin_min_acceptable_scale = twin.ideal.contents.min(twin.raster.contents);
            // Zero until the twin's scales were first computed.
            if twin_min_acceptable_scale != 0.0 {
                min_acceptable_scale = min_acceptable_scale.min(twin_min_acceptable_scale);
            }
        }

        // First pass: ready tiles of acceptable non-ideal tilings stand in.
        let mut high_res = None;
        let mut low_res = None;
        let mut missing_region = Region::from_rect(rect);
        for tiling in self.tilings.tilings() {
            if tiling.resolution() == TileResolution::Low {
                debug_assert!(low_res.is_none(), "there can only be one low res tiling");
                low_res = Some(tiling);
            }
            if tiling.contents_scale() < min_acceptable_scale {
                continue;
            }
            if tiling.resolution() == TileResolution::High {
                debug_assert!(high_res.is_none(), "there can only be one high res tiling");
                high_res = Some(tiling);
                continue;
            }
            for covered in tiling.coverage(1.0, rect) {
                let Some(key) = covered.tile else {
                    continue;
                };
                if !store.tile(key).is_ready_to_draw() {
                    continue;
                }
                missing_region.subtract_rect(covered.geometry_rect);
                tiling.mark_required_for_activation(store, key);
            }
        }
        let Some(high_res) = high_res else {
            debug_assert!(false, "layer {:?} has no high res tiling", self.id);
            return;
        };

        let mut twin_high_res = None;
        let mut twin_low_res = None;
        if let Some(twin) = twin {
            // Only simple tiling sets may skip tiles the twin lacks too.
            if self.tilings.num_tilings() <= 2
                && twin.tilings.num_tilings() <= self.tilings.num_tilings()
            {
                twin_low_res = low_res.and_then(|low| twin.tilings.tiling_at_scale(low.contents_scale()));
                twin_high_res = twin.tilings.tiling_at_scale(high_res.contents_scale());
            }
            if ctx.requires_high_res_to_draw
                || self.bounds != twin.bounds
                || self.draw_properties.screen_space_transform
                    != twin.draw_properties.screen_space_transform
            {
                twin_high_res = None;
                twin_low_res = None;
            }
        }

        // Second pass fills holes from high res; the third falls back to low
        // res where the twin was missing high res content as well.
        if mark_visible_tiles_as_required(store, high_res, twin_high_res, rect, &missing_region) {
            if let Some(low_res) = low_res {
                mark_visible_tiles_as_required(store, low_res, twin_low_res, rect, &missing_region);
            }
        }
    }

    pub fn all_tiles_required_for_activation_are_ready_to_draw(
        &self,
        store: &TileStore,
        ctx: &TreeContext,
    ) -> bool {
        if !ctx.is_pending() || !self.has_valid_tile_priorities(ctx) {
            return true;
        }
        let visible = self.draw_properties.visible_content_rect;
        if visible.is_empty() {
            return true;
        }
        self.tilings
            .tilings()
            .iter()
            .filter(|tiling| tiling.resolution() != TileResolution::NonIdeal)
            .all(|tiling| {
                tiling.coverage(1.0, visible).all(|covered| {
                    covered.tile.is_none_or(|key| {
                        let tile = store.tile(key);
                        !tile.required_for_activation() || tile.is_ready_to_draw()
                    })
                })
            })
    }

    /// Hands this pending layer's tilings and raster state to its active twin.
    /// The twin's old tilings come back here to be recycled.
    pub fn push_properties_to(
        &mut self,
        store: &mut TileStore,
        ctx: &TreeContext,
        target: &mut LayerTileCoordinator,
    ) {
        self.do_post_commit_initialization_if_needed(store, ctx, Some(&*target));

        // Replaced tiles must not keep a stale active priority.
        target.tilings.did_become_recycled(store);

        target.bounds = self.bounds;
        target.draws_content = self.draws_content;
        target.source = Arc::clone(&self.source);
        target.draw_properties = self.draw_properties;

        mem::swap(&mut target.tilings, &mut self.tilings);
        if self.source.is_solid_color() {
            self.tilings.remove_all_tilings(store);
        }
        self.tilings.remove_tiles_in_region(store, &self.invalidation);

        target.raster = self.raster;
        target.low_res_raster_contents_scale = self.low_res_raster_contents_scale;
        target.needs_post_commit_initialization = false;

        target.invalidation = mem::take(&mut self.invalidation);
        self.needs_post_commit_initialization = true;
    }

    pub fn did_become_active(&mut self, store: &mut TileStore) {
        self.tilings.did_become_active(store);
    }

    pub fn release_resources(&mut self, store: &mut TileStore) {
        self.remove_all_tilings(store);
    }

    /// Walks the visible rect at the largest tiling scale and reports which
    /// tile draws each piece.
    pub fn append_draw_coverage(&self, store: &TileStore, ctx: &TreeContext) -> DrawCoverage {
        if let Some(color) = self.source.solid_color() {
            return DrawCoverage {
                contents_scale: 1.0,
                solid_color: Some(color),
                ..DrawCoverage::default()
            };
        }

        let max_contents_scale = self.maximum_tiling_contents_scale(ctx);
        let scaled_bounds = Rect::from_size(self.bounds.scale_to_ceiled(max_contents_scale));
        let scaled_visible_rect = self
            .draw_properties
            .visible_content_rect
            .scale_to_enclosing(max_contents_scale)
            .intersect(scaled_bounds);
        let scaled_viewport = self
            .viewport_for_tile_priority_in_content_space(ctx)
            .scale_to_enclosing(max_contents_scale);

        let mut coverage = DrawCoverage {
            contents_scale: max_contents_scale,
            ..DrawCoverage::default()
        };
        for piece in self.tilings.coverage(
            store,
            max_contents_scale,
            scaled_visible_rect,
            self.ideal.contents,
        ) {
            let drawn = piece.tile.zip(piece.tiling);
            let Some((key, position)) = drawn else {
                if piece.geometry_rect.intersects(scaled_viewport) {
                    coverage.missing_tile_count += 1;
                }
                coverage.entries.push(DrawEntry {
                    geometry_rect: piece.geometry_rect,
                    tile: None,
                    contents_scale: None,
                });
                continue;
            };
            let tiling = self.tilings.tiling_at(position);
            let scale = tiling.contents_scale();
            if tiling.resolution() != TileResolution::High {
                coverage.incomplete_tile_count += 1;
            }
            if !coverage.tilings_used.contains(&scale) {
                coverage.tilings_used.push(scale);
            }
            coverage.entries.push(DrawEntry {
                geometry_rect: piece.geometry_rect,
                tile: Some(key),
                contents_scale: Some(scale),
            });
        }
        coverage
    }
}

fn mark_visible_tiles_as_required(
    store: &mut TileStore,
    tiling: &Tiling,
    twin_tiling: Option<&Tiling>,
    rect: Rect,
    missing_region: &Region,
) -> bool {
    let mut twin_had_missing_tile = false;
    for covered in tiling.coverage(1.0, rect) {
        let Some(key) = covered.tile else {
            continue;
        };
        if store.tile(key).is_occluded(WhichTree::Pending) {
            continue;
        }
        if !missing_region.intersects_rect(covered.geometry_rect) {
            continue;
        }
        if let Some(twin_tiling) = twin_tiling {
            let twin_tile = twin_tiling.tile_at(covered.index);
            if twin_tile.is_none_or(|twin_key| twin_key == key) {
                // A shared tile already drawn by the active tree is not missing.
                if twin_tile.is_none_or(|twin_key| !store.tile(twin_key).is_ready_to_draw()) {
                    twin_had_missing_tile = true;
                }
                continue;
            }
        }
        tiling.mark_required_for_activation(store, key);
    }
    twin_had_missing_tile
}

fn positive_ratio(first: f32, second: f32) -> f32 {
    debug_assert!(first > 0.0 && second > 0.0);
    if first > second {
        first / second
    } else {
        second / first
    }
}

fn skewport_target_time_seconds(ctx: &TreeContext) -> f64 {
    let frames = if ctx.use_gpu_rasterization {
        GPU_SKEWPORT_TARGET_TIME_IN_FRAMES
    } else {
        CPU_SKEWPORT_TARGET_TIME_IN_FRAMES
    };
    frames * ctx.begin_frame_interval_seconds * ctx.settings.skewport_target_time_multiplier as f64
}

fn tiling_client<'a>(
    layer_id: LayerId,
    source: &'a dyn ContentSource,
    ctx: &TreeContext,
    pending_invalidation: Option<&'a Region>,
    twin: Option<&'a TilingSet>,
) -> TilingClient<'a> {
    TilingClient {
        layer_id,
        source,
        source_frame_number: ctx.source_frame_number,
        is_mask: source.is_mask(),
        pending_invalidation,
        twin,
        max_tiles_for_interest_area: ctx.settings.max_tiles_for_interest_area,
        skewport_target_time_seconds: skewport_target_time_seconds(ctx),
        skewport_extrapolation_limit: ctx.settings.skewport_extrapolation_limit_in_content_pixels,
    }
}

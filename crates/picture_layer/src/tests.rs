use std::sync::Arc;

use model::{Rect, Region, Size, TileIndex};
use proptest::prelude::*;
use tiles::{
    ContentSource, EvictionCategory, LayerId, Occlusion, PriorityBin, ResourceId, TileKey,
    TileReadiness, TileResolution, TileStore, Tiling, TilingSet, TreePriority, WhichTree,
};

use super::*;

#[derive(Debug, Default)]
struct Recording {
    solid_color: Option<u32>,
    has_text: bool,
}

impl ContentSource for Recording {
    fn can_raster(&self, _content_rect: Rect, _contents_scale: f32) -> bool {
        true
    }

    fn solid_color(&self) -> Option<u32> {
        self.solid_color
    }

    fn has_text(&self) -> bool {
        self.has_text
    }

    fn has_recordings(&self) -> bool {
        true
    }
}

fn context(generation: TreeGeneration, frame_time_seconds: f64) -> TreeContext {
    let mut ctx = TreeContext::new(
        generation,
        LayerTreeSettings::default(),
        Rect::new(0, 0, 800, 600),
    );
    ctx.frame_time_seconds = frame_time_seconds;
    ctx
}

fn drawn(visible_content_rect: Rect, page_scale_factor: f32, ideal_contents_scale: f32) -> DrawProperties {
    DrawProperties {
        visible_content_rect,
        page_scale_factor,
        ideal_contents_scale,
        is_drawn: true,
        ..DrawProperties::default()
    }
}

fn animating(visible_content_rect: Rect, ideal_contents_scale: f32, maximum_animation_contents_scale: f32) -> DrawProperties {
    DrawProperties {
        screen_space_transform_is_animating: true,
        maximum_animation_contents_scale,
        ..drawn(visible_content_rect, 1.0, ideal_contents_scale)
    }
}

fn layer(id: u64, bounds: Size, visible: Rect) -> LayerTileCoordinator {
    let mut layer = LayerTileCoordinator::new(LayerId(id), Arc::new(Recording::default()));
    layer.set_bounds(bounds);
    layer.set_draw_properties(drawn(visible, 1.0, 1.0));
    layer
}

fn tiling_scales(layer: &LayerTileCoordinator) -> Vec<(f32, TileResolution)> {
    layer
        .tilings()
        .tilings()
        .iter()
        .map(|tiling| (tiling.contents_scale(), tiling.resolution()))
        .collect()
}

fn only_tile(layer: &LayerTileCoordinator, contents_scale: f32) -> TileKey {
    let tiling = layer
        .tilings()
        .tiling_at_scale(contents_scale)
        .expect("tiling at scale");
    let keys: Vec<TileKey> = tiling.tiles().map(|(_, key)| key).collect();
    assert_eq!(keys.len(), 1, "expected a single tile at scale {contents_scale}");
    keys[0]
}

fn make_everything_ready(store: &mut TileStore) {
    let keys: Vec<TileKey> = store.iter().map(|(key, _)| key).collect();
    for (resource, key) in keys.into_iter().enumerate() {
        assert!(store.complete_raster(key, TileReadiness::Resource(ResourceId(resource as u64))));
    }
}

/// Active layer zoomed by pinch from 1.0 to 2.5 in two steps.
fn pinched_active_layer(store: &mut TileStore) -> (LayerTileCoordinator, TreeContext) {
    let mut layer = layer(1, Size::new(1000, 1000), Rect::new(0, 0, 800, 600));
    let ctx = context(TreeGeneration::Active, 1.0);
    layer.update_tiles(store, &ctx, None, &Occlusion::none());
    assert_eq!(
        tiling_scales(&layer),
        vec![(1.0, TileResolution::High), (0.25, TileResolution::Low)]
    );

    let mut pinch = context(TreeGeneration::Active, 2.0);
    pinch.pinch_gesture_active = true;
    layer.set_draw_properties(drawn(Rect::new(0, 0, 800, 600), 1.5, 1.5));
    layer.update_tiles(store, &pinch, None, &Occlusion::none());
    assert_eq!(layer.raster_contents_scale(), 1.0);

    pinch.frame_time_seconds = 3.0;
    layer.set_draw_properties(drawn(Rect::new(0, 0, 800, 600), 2.5, 2.5));
    let added = layer.update_tiles(store, &pinch, None, &Occlusion::none());
    assert_eq!(added, vec![2.0]);
    (layer, pinch)
}

#[test]
fn small_layer_tile_size_rounds_up_to_64() {
    let layer = layer(1, Size::new(100, 100), Rect::new(0, 0, 100, 100));
    let ctx = context(TreeGeneration::Active, 1.0);
    assert_eq!(
        layer.calculate_tile_size(&ctx, Size::new(100, 100)),
        Size::new(128, 128)
    );
}

#[test]
fn minimum_contents_scale_keeps_one_content_pixel() {
    let ctx = context(TreeGeneration::Active, 1.0);
    let cases = [
        (Size::new(0, 0), 0.0625),
        (Size::new(4, 100), 0.25),
        (Size::new(10, 10), 0.1),
        (Size::new(1000, 2000), 0.0625),
    ];
    for (bounds, expected) in cases {
        let layer = layer(1, bounds, Rect::from_size(bounds));
        assert_eq!(layer.minimum_contents_scale(&ctx), expected, "{bounds:?}");
    }
}

#[test]
fn plan_creates_low_res_only_when_distinct_and_allowed() {
    let tilings = TilingSet::new(Size::new(1000, 1000));

    let plan = plan_tilings_for_raster_scale(&tilings, 1.0, 0.25, true);
    assert_eq!(plan.create, vec![1.0, 0.25]);
    assert_eq!(plan.low_res_scale, Some(0.25));

    let plan = plan_tilings_for_raster_scale(&tilings, 1.0, 1.0, true);
    assert_eq!(plan.create, vec![1.0]);
    assert_eq!(plan.low_res_scale, None);

    let plan = plan_tilings_for_raster_scale(&tilings, 1.0, 0.25, false);
    assert_eq!(plan.create, vec![1.0]);
    assert_eq!(plan.low_res_scale, None);
}

#[test]
fn pinch_steps_raster_scale_by_two_and_keeps_low_res() {
    let mut store = TileStore::new();
    let (layer, _) = pinched_active_layer(&mut store);

    assert_eq!(layer.raster_contents_scale(), 2.0);
    assert_eq!(layer.raster_scales().page, 2.0);
    assert_eq!(layer.ideal_contents_scale(), 2.5);
    assert_eq!(
        tiling_scales(&layer),
        vec![
            (2.0, TileResolution::High),
            (1.0, TileResolution::NonIdeal),
            (0.25, TileResolution::Low),
        ]
    );
}

#[test]
fn snapping_resolves_to_existing_tiling_within_ratio() {
    let mut store = TileStore::new();
    let (layer, _) = pinched_active_layer(&mut store);

    assert_eq!(layer.snapped_contents_scale(2.1), 2.0);
    assert_eq!(layer.snapped_contents_scale(1.15), 1.0);
    assert_eq!(layer.snapped_contents_scale(2.5), 2.5);
}

#[test]
fn cleanup_drops_out_of_range_tilings_unless_used() {
    let mut store = TileStore::new();
    let (mut layer, ctx) = pinched_active_layer(&mut store);

    let outcome = layer.clean_up_tilings_on_active_layer(&mut store, &ctx, &[1.0], None);
    assert!(outcome.removed.is_empty());

    let outcome = layer.clean_up_tilings_on_active_layer(&mut store, &ctx, &[], None);
    assert_eq!(outcome.removed, vec![1.0]);
    assert!(outcome.remove_from_twin.is_empty());
    assert_eq!(
        tiling_scales(&layer),
        vec![(2.0, TileResolution::High), (0.25, TileResolution::Low)]
    );
}

#[test]
fn solid_color_layer_never_tiles() {
    let mut store = TileStore::new();
    let mut layer = LayerTileCoordinator::new(
        LayerId(3),
        Arc::new(Recording {
            solid_color: Some(0xff00_ff00),
            ..Recording::default()
        }),
    );
    layer.set_bounds(Size::new(300, 300));
    layer.set_draw_properties(drawn(Rect::new(0, 0, 300, 300), 1.0, 1.0));
    let ctx = context(TreeGeneration::Active, 1.0);

    assert!(!layer.can_have_tilings());
    let added = layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert!(added.is_empty());
    assert!(layer.tilings().is_empty());
    assert_eq!(layer.raster_scales(), ScaleComponents::default());
    assert_eq!(layer.ideal_scales(), ScaleComponents::default());
    assert_eq!(layer.low_res_raster_contents_scale(), 0.0);
    assert!(store.is_empty());

    let coverage = layer.append_draw_coverage(&store, &ctx);
    assert_eq!(coverage.solid_color, Some(0xff00_ff00));
    assert!(coverage.entries.is_empty());
}

#[test]
fn sync_resets_raster_scale_when_high_res_falls_below_minimum() {
    let mut store = TileStore::new();
    let pending_ctx = context(TreeGeneration::Pending, 1.0);
    let mut pending = layer(5, Size::new(100, 100), Rect::new(0, 0, 100, 100));
    pending.set_draw_properties(drawn(Rect::new(0, 0, 100, 100), 1.0, 0.2));
    pending.update_tiles(&mut store, &pending_ctx, None, &Occlusion::none());
    assert_eq!(tiling_scales(&pending), vec![(0.2, TileResolution::High)]);

    let mut active = LayerTileCoordinator::new(LayerId(5), Arc::clone(pending.source()));
    pending.push_properties_to(&mut store, &pending_ctx, &mut active);
    active.did_become_active(&mut store);
    assert_eq!(active.raster_contents_scale(), 0.2);
    assert!(pending.needs_post_commit_initialization());

    pending.set_bounds(Size::new(4, 4));
    pending.do_post_commit_initialization_if_needed(&mut store, &pending_ctx, Some(&active));

    assert_eq!(pending.raster_contents_scale(), 0.0);
    assert!(pending.tilings().is_empty());
    assert!(!pending.needs_post_commit_initialization());
}

#[test]
fn ready_non_ideal_tiling_satisfies_activation() {
    let mut store = TileStore::new();
    let visible = Rect::new(0, 0, 100, 100);
    let mut pending = layer(2, Size::new(100, 100), visible);
    pending.set_draw_properties(drawn(visible, 2.0, 2.0));
    let first = context(TreeGeneration::Pending, 1.0);
    pending.update_tiles(&mut store, &first, None, &Occlusion::none());
    assert_eq!(tiling_scales(&pending), vec![(2.0, TileResolution::High)]);

    let zoomed_tile = only_tile(&pending, 2.0);
    assert!(store.tile(zoomed_tile).required_for_activation());
    assert!(!pending.all_tiles_required_for_activation_are_ready_to_draw(&store, &first));
    make_everything_ready(&mut store);
    assert!(pending.all_tiles_required_for_activation_are_ready_to_draw(&store, &first));

    pending.set_draw_properties(drawn(visible, 1.0, 1.0));
    let second = context(TreeGeneration::Pending, 2.0);
    pending.update_tiles(&mut store, &second, None, &Occlusion::none());
    assert_eq!(
        tiling_scales(&pending),
        vec![(2.0, TileResolution::NonIdeal), (1.0, TileResolution::High)]
    );

    let high_res_tile = only_tile(&pending, 1.0);
    assert!(!store.tile(high_res_tile).required_for_activation());
    assert!(store.tile(zoomed_tile).required_for_activation());
    assert!(pending.all_tiles_required_for_activation_are_ready_to_draw(&store, &second));
}

/// A pending layer at scale 1.0 pushed once into a fresh active twin.
fn committed_pair(store: &mut TileStore) -> (LayerTileCoordinator, LayerTileCoordinator) {
    let visible = Rect::new(0, 0, 100, 100);
    let mut pending = layer(9, Size::new(100, 100), visible);
    let ctx = context(TreeGeneration::Pending, 1.0);
    pending.update_tiles(store, &ctx, None, &Occlusion::none());

    let mut active = LayerTileCoordinator::new(LayerId(9), Arc::clone(pending.source()));
    pending.push_properties_to(store, &ctx, &mut active);
    active.did_become_active(store);
    assert!(pending.tilings().is_empty());
    assert_eq!(tiling_scales(&active), vec![(1.0, TileResolution::High)]);
    (pending, active)
}

#[test]
fn shared_tile_missing_on_active_twin_is_not_required() {
    let mut store = TileStore::new();
    let (mut pending, active) = committed_pair(&mut store);
    let active_tile = only_tile(&active, 1.0);

    let ctx = context(TreeGeneration::Pending, 2.0);
    pending.update_tiles(&mut store, &ctx, Some(&active), &Occlusion::none());

    assert_eq!(only_tile(&pending, 1.0), active_tile);
    assert_eq!(store.ref_count(active_tile), 2);
    assert!(!store.tile(active_tile).required_for_activation());
}

#[test]
fn invalidated_tile_is_recreated_and_required() {
    let mut store = TileStore::new();
    let (mut pending, active) = committed_pair(&mut store);
    let active_tile = only_tile(&active, 1.0);

    pending.union_invalidation(&Region::from_rect(Rect::new(0, 0, 10, 10)));
    let ctx = context(TreeGeneration::Pending, 2.0);
    pending.update_tiles(&mut store, &ctx, Some(&active), &Occlusion::none());

    let fresh_tile = only_tile(&pending, 1.0);
    assert_ne!(fresh_tile, active_tile);
    assert!(store.tile(fresh_tile).required_for_activation());
    assert_eq!(store.ref_count(active_tile), 1);
}

#[test]
fn push_moves_invalidation_and_recycles_old_tilings() {
    let mut store = TileStore::new();
    let (mut pending, mut active) = committed_pair(&mut store);
    let ctx = context(TreeGeneration::Pending, 2.0);
    pending.union_invalidation(&Region::from_rect(Rect::new(0, 0, 10, 10)));
    pending.update_tiles(&mut store, &ctx, Some(&active), &Occlusion::none());
    let old_active_tile = only_tile(&active, 1.0);

    pending.push_properties_to(&mut store, &ctx, &mut active);

    assert!(!active.invalidation().is_empty());
    assert!(pending.invalidation().is_empty());
    assert!(pending.needs_post_commit_initialization());
    assert!(!active.needs_post_commit_initialization());
    // The invalidated tile is dropped from the tilings handed back to pending.
    assert!(!store.contains(old_active_tile));
    assert_eq!(pending.tilings().tiling_at_scale(1.0).map(|tiling| tiling.num_tiles()), Some(0));
}

#[test]
fn draw_coverage_reports_checkerboard_until_ready() {
    let mut store = TileStore::new();
    let visible = Rect::new(0, 0, 100, 100);
    let mut active = layer(4, Size::new(100, 100), visible);
    let ctx = context(TreeGeneration::Active, 1.0);
    active.update_tiles(&mut store, &ctx, None, &Occlusion::none());

    let coverage = active.append_draw_coverage(&store, &ctx);
    assert_eq!(coverage.contents_scale, 1.0);
    assert_eq!(coverage.entries.len(), 1);
    assert_eq!(coverage.entries[0].tile, None);
    assert_eq!(coverage.missing_tile_count, 1);
    assert!(coverage.tilings_used.is_empty());

    make_everything_ready(&mut store);
    let coverage = active.append_draw_coverage(&store, &ctx);
    assert_eq!(coverage.missing_tile_count, 0);
    assert_eq!(coverage.incomplete_tile_count, 0);
    assert_eq!(coverage.tilings_used, vec![1.0]);
    assert_eq!(
        coverage.entries,
        vec![DrawEntry {
            geometry_rect: visible,
            tile: Some(only_tile(&active, 1.0)),
            contents_scale: Some(1.0),
        }]
    );
}

/// Pending layer with a 4x4 high res grid and a single low res tile.
fn prioritized_pending_layer(store: &mut TileStore) -> (LayerTileCoordinator, TreeContext) {
    let mut pending = layer(6, Size::new(1000, 1000), Rect::new(0, 0, 300, 300));
    let ctx = context(TreeGeneration::Pending, 1.0);
    pending.update_tiles(store, &ctx, None, &Occlusion::none());
    assert_eq!(
        tiling_scales(&pending),
        vec![(1.0, TileResolution::High), (0.25, TileResolution::Low)]
    );
    (pending, ctx)
}

#[test]
fn raster_iterator_orders_by_bin_for_both_configurations() {
    let mut store = TileStore::new();
    let (pending, ctx) = prioritized_pending_layer(&mut store);
    let low_res_tile = only_tile(&pending, 0.25);

    for prioritize_low_res in [false, true] {
        let order: Vec<TileKey> =
            RasterPriorityIterator::new(&pending, &store, &ctx, prioritize_low_res).collect();
        assert_eq!(order.len(), 17);

        let bins: Vec<PriorityBin> = order
            .iter()
            .map(|key| store.tile(*key).priority(WhichTree::Pending).bin)
            .collect();
        assert!(bins.windows(2).all(|pair| pair[0] <= pair[1]), "{bins:?}");
        assert_eq!(bins.iter().filter(|bin| **bin == PriorityBin::Now).count(), 5);

        let low_res_position = order.iter().position(|key| *key == low_res_tile);
        let expected = if prioritize_low_res { 0 } else { 4 };
        assert_eq!(low_res_position, Some(expected));
    }
}

#[test]
fn raster_iterator_is_empty_without_valid_priorities() {
    let mut store = TileStore::new();
    let (mut pending, ctx) = prioritized_pending_layer(&mut store);

    let recycle = context(TreeGeneration::Recycle, 1.0);
    assert!(RasterPriorityIterator::new(&pending, &store, &recycle, false).is_empty());

    let mut hidden = *pending.draw_properties();
    hidden.is_drawn = false;
    pending.set_draw_properties(hidden);
    let mut iterator = RasterPriorityIterator::new(&pending, &store, &ctx, false);
    assert!(iterator.is_empty());
    assert_eq!(iterator.next(), None);
}

#[test]
fn raster_iterator_skips_ready_tiles() {
    let mut store = TileStore::new();
    let (pending, ctx) = prioritized_pending_layer(&mut store);
    make_everything_ready(&mut store);
    assert_eq!(
        RasterPriorityIterator::new(&pending, &store, &ctx, false).count(),
        0
    );
}

#[test]
fn eviction_keeps_required_tiles_for_last() {
    let mut store = TileStore::new();
    let (pending, _) = prioritized_pending_layer(&mut store);
    make_everything_ready(&mut store);

    let mut categories = Vec::new();
    let mut order = Vec::new();
    let mut iterator =
        EvictionPriorityIterator::new(&pending, &store, TreePriority::SamePriorityForBothTrees);
    while let Some(category) = iterator.current_category() {
        let Some(key) = iterator.next() else {
            break;
        };
        categories.push(category);
        order.push(key);
    }
    assert_eq!(order.len(), 17);

    let positions: Vec<usize> = categories.iter().map(|category| category.position()).collect();
    assert!(positions.windows(2).all(|pair| pair[0] <= pair[1]), "{categories:?}");
    assert_eq!(
        categories[13..],
        [EvictionCategory::NowAndRequiredForActivation; 4]
    );
    assert!(order[13..]
        .iter()
        .all(|key| store.tile(*key).required_for_activation()));
    assert_eq!(order[12], only_tile(&pending, 0.25));

    let distances: Vec<f32> = order[..12]
        .iter()
        .map(|key| store.tile(*key).priority(WhichTree::Pending).distance_to_visible)
        .collect();
    assert!(distances.windows(2).all(|pair| pair[0] >= pair[1]), "{distances:?}");
}

#[test]
fn eviction_step_table_walks_every_range_per_category() {
    assert_eq!(EVICTION_STEPS.len(), 30);
    assert_eq!(EVICTION_STEPS[0].0, EvictionCategory::Eventually);
    assert_eq!(EVICTION_STEPS[4].0, EvictionCategory::Eventually);
    assert_eq!(
        EVICTION_STEPS[29].0,
        EvictionCategory::NowAndRequiredForActivation
    );
    for chunk in EVICTION_STEPS.chunks(5) {
        assert!(chunk.iter().all(|(category, _)| *category == chunk[0].0));
    }
}

#[test]
fn release_resources_leaves_no_tiles_behind() {
    let mut store = TileStore::new();
    let (mut pending, _) = prioritized_pending_layer(&mut store);
    assert!(!store.is_empty());

    pending.release_resources(&mut store);
    assert!(pending.tilings().is_empty());
    assert!(store.is_empty());
    assert_eq!(pending.raster_contents_scale(), 0.0);
}

/// A 1000x1000 layer updated once at scale 1.0 in the given generation.
fn settled_layer(
    store: &mut TileStore,
    id: u64,
    generation: TreeGeneration,
    source: Recording,
    use_gpu_rasterization: bool,
) -> (LayerTileCoordinator, TreeContext) {
    let mut layer = LayerTileCoordinator::new(LayerId(id), Arc::new(source));
    layer.set_bounds(Size::new(1000, 1000));
    layer.set_draw_properties(drawn(Rect::new(0, 0, 800, 600), 1.0, 1.0));
    let mut ctx = context(generation, 1.0);
    ctx.use_gpu_rasterization = use_gpu_rasterization;
    layer.update_tiles(store, &ctx, None, &Occlusion::none());
    assert_eq!(layer.raster_contents_scale(), 1.0);
    (layer, ctx)
}

#[test]
fn animation_start_and_stop_both_recompute_raster_scale() {
    let mut store = TileStore::new();
    let (mut layer, mut ctx) =
        settled_layer(&mut store, 20, TreeGeneration::Active, Recording::default(), false);
    assert!(!layer.should_adjust_raster_scale(&ctx));

    layer.set_draw_properties(animating(Rect::new(0, 0, 800, 600), 1.0, 0.0));
    assert!(layer.should_adjust_raster_scale(&ctx));
    ctx.frame_time_seconds = 2.0;
    layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert!(!layer.should_adjust_raster_scale(&ctx));

    layer.set_draw_properties(drawn(Rect::new(0, 0, 800, 600), 1.0, 1.0));
    assert!(layer.should_adjust_raster_scale(&ctx));
}

#[test]
fn text_on_gpu_raster_keeps_raster_scale_during_animation() {
    let visible = Rect::new(0, 0, 800, 600);
    for has_text in [false, true] {
        let mut store = TileStore::new();
        let source = Recording {
            has_text,
            ..Recording::default()
        };
        let (mut layer, mut ctx) =
            settled_layer(&mut store, 21, TreeGeneration::Active, source, true);

        layer.set_draw_properties(animating(visible, 1.0, 0.0));
        ctx.frame_time_seconds = 2.0;
        layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());
        assert_eq!(layer.raster_contents_scale(), 1.0);

        layer.set_draw_properties(animating(visible, 1.5, 0.0));
        ctx.frame_time_seconds = 3.0;
        let added = layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());
        if has_text {
            assert!(added.is_empty());
            assert_eq!(layer.raster_contents_scale(), 1.0);
        } else {
            assert_eq!(added, vec![1.5]);
            assert_eq!(layer.raster_contents_scale(), 1.5);
            assert_eq!(layer.tilings().num_low_res_tilings(), 1);
        }
    }
}

#[test]
fn page_scale_change_outside_pinch_follows_ideal_without_snapping() {
    let mut store = TileStore::new();
    let (mut layer, mut ctx) =
        settled_layer(&mut store, 22, TreeGeneration::Active, Recording::default(), false);

    layer.set_draw_properties(drawn(Rect::new(0, 0, 800, 600), 1.1, 1.1));
    ctx.frame_time_seconds = 2.0;
    let added = layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());

    let low_res_scale = 1.1 * 0.25;
    assert_eq!(added, vec![1.1, low_res_scale]);
    assert_eq!(
        tiling_scales(&layer),
        vec![
            (1.1, TileResolution::High),
            (1.0, TileResolution::NonIdeal),
            (low_res_scale, TileResolution::Low),
            (0.25, TileResolution::NonIdeal),
        ]
    );
}

#[test]
fn device_scale_change_rescales_raster() {
    let mut store = TileStore::new();
    let (mut layer, mut ctx) =
        settled_layer(&mut store, 23, TreeGeneration::Active, Recording::default(), false);

    layer.set_draw_properties(DrawProperties {
        device_scale_factor: 2.0,
        ..drawn(Rect::new(0, 0, 800, 600), 1.0, 2.0)
    });
    ctx.frame_time_seconds = 2.0;
    layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());

    assert_eq!(
        layer.raster_scales(),
        ScaleComponents {
            page: 1.0,
            device: 2.0,
            source: 1.0,
            contents: 2.0,
        }
    );
    assert!(!layer.raster_source_scale_is_fixed());
}

#[test]
fn pinch_zoom_out_steps_down_to_existing_tiling() {
    let mut store = TileStore::new();
    let (mut layer, mut pinch) = pinched_active_layer(&mut store);

    layer.set_draw_properties(drawn(Rect::new(0, 0, 800, 600), 1.5, 1.5));
    pinch.frame_time_seconds = 4.0;
    let added = layer.update_tiles(&mut store, &pinch, None, &Occlusion::none());

    assert!(added.is_empty());
    assert_eq!(layer.raster_contents_scale(), 1.0);
    assert_eq!(
        tiling_scales(&layer),
        vec![
            (2.0, TileResolution::NonIdeal),
            (1.0, TileResolution::High),
            (0.25, TileResolution::Low),
        ]
    );
}

#[test]
fn source_scale_change_outside_animation_latches_fixed_source_scale() {
    let mut store = TileStore::new();
    let visible = Rect::new(0, 0, 800, 600);
    let (mut layer, mut ctx) =
        settled_layer(&mut store, 24, TreeGeneration::Active, Recording::default(), false);

    layer.set_draw_properties(drawn(visible, 1.0, 2.0));
    ctx.frame_time_seconds = 2.0;
    let added = layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert!(added.is_empty());
    assert!(layer.raster_source_scale_is_fixed());
    assert_eq!(layer.raster_contents_scale(), 1.0);
    assert_eq!(layer.raster_scales().source, 1.0);
    assert_eq!(layer.ideal_scales().source, 2.0);

    layer.set_draw_properties(drawn(visible, 1.0, 3.0));
    ctx.frame_time_seconds = 3.0;
    let added = layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert!(added.is_empty());
    assert_eq!(layer.ideal_contents_scale(), 3.0);
    assert_eq!(layer.raster_contents_scale(), 1.0);
    assert!(!layer.should_adjust_raster_scale(&ctx));

    layer.remove_all_tilings(&mut store);
    assert!(!layer.raster_source_scale_is_fixed());
    assert_eq!(layer.raster_scales(), ScaleComponents::default());
}

#[test]
fn source_scale_change_at_animation_start_is_followed() {
    let mut store = TileStore::new();
    let (mut layer, mut ctx) =
        settled_layer(&mut store, 25, TreeGeneration::Active, Recording::default(), false);

    layer.set_draw_properties(animating(Rect::new(0, 0, 800, 600), 2.0, 0.0));
    ctx.frame_time_seconds = 2.0;
    layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());

    assert!(!layer.raster_source_scale_is_fixed());
    assert_eq!(layer.raster_contents_scale(), 2.0);
    assert_eq!(layer.raster_scales().source, 2.0);
}

#[test]
fn animation_rasters_at_maximum_scale_only_when_it_fits_the_viewport() {
    let mut store = TileStore::new();

    let visible = Rect::new(0, 0, 100, 100);
    let mut small = layer(26, Size::new(100, 100), visible);
    let mut ctx = context(TreeGeneration::Active, 1.0);
    small.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    small.set_draw_properties(animating(visible, 0.5, 3.0));
    ctx.frame_time_seconds = 2.0;
    small.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert_eq!(small.ideal_contents_scale(), 0.5);
    assert_eq!(small.raster_contents_scale(), 3.0);

    let (mut large, mut ctx) =
        settled_layer(&mut store, 27, TreeGeneration::Active, Recording::default(), false);
    large.set_draw_properties(animating(Rect::new(0, 0, 800, 600), 0.5, 3.0));
    ctx.frame_time_seconds = 2.0;
    large.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert_eq!(large.raster_contents_scale(), 1.0);

    let (mut gpu, mut ctx) =
        settled_layer(&mut store, 28, TreeGeneration::Active, Recording::default(), true);
    gpu.set_draw_properties(animating(Rect::new(0, 0, 800, 600), 0.5, 3.0));
    ctx.frame_time_seconds = 2.0;
    gpu.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert_eq!(gpu.raster_contents_scale(), 0.5);
}

#[test]
fn low_res_becomes_required_where_active_twin_lacks_high_res() {
    let mut store = TileStore::new();
    let (mut pending, ctx) =
        settled_layer(&mut store, 29, TreeGeneration::Pending, Recording::default(), false);
    assert_eq!(
        tiling_scales(&pending),
        vec![(1.0, TileResolution::High), (0.25, TileResolution::Low)]
    );
    let mut active = LayerTileCoordinator::new(LayerId(29), Arc::clone(pending.source()));
    pending.push_properties_to(&mut store, &ctx, &mut active);
    active.did_become_active(&mut store);

    pending.union_invalidation(&Region::from_rect(Rect::new(0, 0, 10, 10)));
    let second = context(TreeGeneration::Pending, 2.0);
    pending.update_tiles(&mut store, &second, Some(&active), &Occlusion::none());

    let high_res = pending.tilings().tiling_at_scale(1.0).expect("high res tiling");
    let active_high_res = active.tilings().tiling_at_scale(1.0).expect("active high res");
    let recreated = high_res.tile_at(TileIndex::new(0, 0)).expect("invalidated tile");
    let shared = high_res.tile_at(TileIndex::new(1, 0)).expect("shared tile");
    assert_ne!(Some(recreated), active_high_res.tile_at(TileIndex::new(0, 0)));
    assert_eq!(Some(shared), active_high_res.tile_at(TileIndex::new(1, 0)));
    assert!(store.tile(recreated).required_for_activation());
    assert!(!store.tile(shared).required_for_activation());

    let low_res = only_tile(&pending, 0.25);
    assert_ne!(low_res, only_tile(&active, 0.25));
    assert!(store.tile(low_res).required_for_activation());
}

#[test]
fn sync_tiling_mirrors_scale_and_prioritizes_when_current() {
    let mut store = TileStore::new();
    let visible = Rect::new(0, 0, 100, 100);
    let mut twin = layer(30, Size::new(100, 100), visible);
    let ctx = context(TreeGeneration::Active, 1.0);
    twin.update_tiles(&mut store, &ctx, None, &Occlusion::none());
    assert_eq!(tiling_scales(&twin), vec![(1.0, TileResolution::High)]);

    twin.sync_tiling(&mut store, &ctx, 0.01, None);
    assert_eq!(twin.tilings().num_tilings(), 1);

    twin.sync_tiling(&mut store, &ctx, 2.0, None);
    assert_eq!(
        tiling_scales(&twin),
        vec![(2.0, TileResolution::NonIdeal), (1.0, TileResolution::High)]
    );
    assert_eq!(
        twin.tilings().tiling_at_scale(2.0).map(|tiling| tiling.num_tiles()),
        Some(1)
    );

    let mut stale = ctx;
    stale.needs_update_draw_properties = true;
    twin.sync_tiling(&mut store, &stale, 0.5, None);
    assert_eq!(
        twin.tilings().tiling_at_scale(0.5).map(|tiling| tiling.num_tiles()),
        Some(0)
    );

    twin.sync_tiling(&mut store, &ctx, 2.0, None);
    assert_eq!(twin.tilings().num_tilings(), 3);
}

#[derive(Debug, Clone, Copy)]
struct UpdateStep {
    page_scale: f32,
    device_scale: f32,
    source_scale: f32,
    pinching: bool,
    animating: bool,
    maximum_animation_contents_scale: f32,
    clean_up: bool,
}

fn update_step() -> impl Strategy<Value = UpdateStep> {
    (
        0.5f32..3.0,
        prop_oneof![Just(1.0f32), Just(2.0f32)],
        prop_oneof![Just(0.5f32), Just(1.0f32), Just(2.0f32)],
        any::<bool>(),
        any::<bool>(),
        prop_oneof![Just(0.0f32), Just(1.0f32), Just(4.0f32)],
        any::<bool>(),
    )
        .prop_map(
            |(page_scale, device_scale, source_scale, pinching, animating, maximum, clean_up)| {
                UpdateStep {
                    page_scale,
                    device_scale,
                    source_scale,
                    pinching,
                    animating,
                    maximum_animation_contents_scale: maximum,
                    clean_up,
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0x7115),
        .. ProptestConfig::default()
    })]

    #[test]
    fn tiling_set_never_holds_two_high_or_two_low_tilings(
        has_text in any::<bool>(),
        use_gpu_rasterization in any::<bool>(),
        steps in proptest::collection::vec(update_step(), 1..24),
    ) {
        let mut store = TileStore::new();
        let source = Recording {
            has_text,
            ..Recording::default()
        };
        let mut layer = LayerTileCoordinator::new(LayerId(31), Arc::new(source));
        layer.set_bounds(Size::new(300, 200));
        let visible = Rect::new(0, 0, 300, 200);

        for (frame, step) in steps.iter().enumerate() {
            let mut ctx = context(TreeGeneration::Active, frame as f64 + 1.0);
            ctx.pinch_gesture_active = step.pinching;
            ctx.use_gpu_rasterization = use_gpu_rasterization;
            layer.set_draw_properties(DrawProperties {
                device_scale_factor: step.device_scale,
                screen_space_transform_is_animating: step.animating,
                maximum_animation_contents_scale: step.maximum_animation_contents_scale,
                ..drawn(
                    visible,
                    step.page_scale,
                    step.page_scale * step.device_scale * step.source_scale,
                )
            });
            layer.update_tiles(&mut store, &ctx, None, &Occlusion::none());
            if step.clean_up {
                layer.clean_up_tilings_on_active_layer(&mut store, &ctx, &[], None);
            }

            let tilings = layer.tilings();
            prop_assert_eq!(tilings.num_high_res_tilings(), 1, "{:?}", step);
            prop_assert!(tilings.num_low_res_tilings() <= 1, "{:?}", step);
            prop_assert_eq!(
                tilings.find_tiling_with_resolution(TileResolution::High).map(Tiling::contents_scale),
                Some(layer.raster_contents_scale())
            );
        }
    }
}

use std::collections::HashMap;

use model::{Rect, Region, Size, TileIndex, TileMask, TilingData};

use crate::coverage::TilingCoverage;
use crate::priority::{
    EvictionCategory, PriorityBin, TilePriority, TileResolution, TreePriority, WhichTree,
};
use crate::source::{ContentSource, Occlusion};
use crate::tile::{RasterFlags, Tile, TileKey, TileStore};
use crate::tiling_set::TilingSet;
use crate::LayerId;

/// What a tiling needs to know about its layer while creating tiles and
/// computing priorities.
#[derive(Debug, Clone, Copy)]
pub struct TilingClient<'a> {
    pub layer_id: LayerId,
    pub source: &'a dyn ContentSource,
    pub source_frame_number: u64,
    pub is_mask: bool,
    /// Layer-space region that differs between the pending tree and the
    /// active tree. Twin tiles touching it are not shared.
    pub pending_invalidation: Option<&'a Region>,
    pub twin: Option<&'a TilingSet>,
    pub max_tiles_for_interest_area: usize,
    pub skewport_target_time_seconds: f64,
    pub skewport_extrapolation_limit: i32,
}

#[derive(Debug, Clone)]
pub struct Tiling {
    contents_scale: f32,
    layer_bounds: Size,
    data: TilingData,
    resolution: TileResolution,
    tiles: HashMap<TileIndex, TileKey>,
    live_tiles_rect: Rect,
    last_frame_time: Option<f64>,
    last_visible_rect: Rect,
    visible_rect: Rect,
    skewport_rect: Rect,
    eventually_rect: Rect,
}

impl Tiling {
    pub fn new(contents_scale: f32, layer_bounds: Size, tile_size: Size) -> Self {
        assert!(
            contents_scale.is_finite() && contents_scale > 0.0,
            "tiling contents scale must be finite and positive: {contents_scale}"
        );
        let content_bounds = layer_bounds.scale_to_ceiled(contents_scale);
        Self {
            contents_scale,
            layer_bounds,
            data: TilingData::new(tile_size, content_bounds),
            resolution: TileResolution::NonIdeal,
            tiles: HashMap::new(),
            live_tiles_rect: Rect::default(),
            last_frame_time: None,
            last_visible_rect: Rect::default(),
            visible_rect: Rect::default(),
            skewport_rect: Rect::default(),
            eventually_rect: Rect::default(),
        }
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    pub fn layer_bounds(&self) -> Size {
        self.layer_bounds
    }

    pub fn tile_size(&self) -> Size {
        self.data.tile_size()
    }

    pub fn tiling_size(&self) -> Size {
        self.data.tiling_size()
    }

    pub fn tiling_data(&self) -> &TilingData {
        &self.data
    }

    pub fn resolution(&self) -> TileResolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: TileResolution) {
        self.resolution = resolution;
    }

    pub fn tile_at(&self, index: TileIndex) -> Option<TileKey> {
        self.tiles.get(&index).copied()
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> impl Iterator<Item = (TileIndex, TileKey)> + '_ {
        self.tiles.iter().map(|(index, key)| (*index, *key))
    }

    pub fn live_tiles_rect(&self) -> Rect {
        self.live_tiles_rect
    }

    pub fn visible_rect(&self) -> Rect {
        self.visible_rect
    }

    pub fn skewport_rect(&self) -> Rect {
        self.skewport_rect
    }

    pub fn eventually_rect(&self) -> Rect {
        self.eventually_rect
    }

    pub fn needs_update_for_frame_at_time(&self, frame_time_seconds: f64) -> bool {
        self.last_frame_time != Some(frame_time_seconds)
    }

    pub fn coverage(&self, dest_scale: f32, dest_rect: Rect) -> TilingCoverage<'_> {
        TilingCoverage::new(self, dest_scale, dest_rect)
    }

    pub fn mark_required_for_activation(&self, store: &mut TileStore, key: TileKey) {
        debug_assert!(
            self.tiles.values().any(|held| *held == key),
            "tile {key:?} is not part of tiling at scale {}",
            self.contents_scale
        );
        store.tile_mut(key).mark_required_for_activation();
    }

    pub fn update_tile_priorities(
        &mut self,
        store: &mut TileStore,
        client: &TilingClient<'_>,
        tree: WhichTree,
        visible_layer_rect: Rect,
        ideal_contents_scale: f32,
        frame_time_seconds: f64,
        occlusion: &Occlusion,
    ) {
        if !self.needs_update_for_frame_at_time(frame_time_seconds) {
            return;
        }

        let visible_rect = visible_layer_rect.scale_to_enclosing(self.contents_scale);
        if self.tiling_size().is_empty() {
            self.last_frame_time = Some(frame_time_seconds);
            self.last_visible_rect = visible_rect;
            return;
        }

        let skewport = self.compute_skewport(client, frame_time_seconds, visible_rect);
        let tile_area = self.tile_size().area();
        let eventually_area = tile_area.saturating_mul(client.max_tiles_for_interest_area as i64);
        let eventually_rect =
            expand_rect_equally_to_area_bounded_by(visible_rect, eventually_area, self.data.tiling_rect());

        self.set_live_tiles_rect(store, client, eventually_rect);
        self.last_frame_time = Some(frame_time_seconds);
        self.last_visible_rect = visible_rect;

        let mut assigned = TileMask::new(self.data);
        let now_priority = TilePriority::new(self.resolution, PriorityBin::Now, 0.0);
        if let Some(range) = self.data.tile_range(visible_rect) {
            for index in range.iter() {
                let Some(key) = self.tile_at(index) else {
                    continue;
                };
                assigned.insert(index);
                let tile = store.tile_mut(key);
                tile.set_priority(tree, now_priority);
                let query_rect = tile
                    .content_rect()
                    .intersect(visible_rect)
                    .scale_to_enclosing(1.0 / self.contents_scale);
                tile.set_occluded(tree, occlusion.is_occluded(query_rect));
            }
        }

        let content_to_screen_scale = ideal_contents_scale / self.contents_scale;
        for (rect, bin) in [
            (skewport, PriorityBin::Soon),
            (eventually_rect, PriorityBin::Eventually),
        ] {
            let Some(range) = self.data.tile_range(rect) else {
                continue;
            };
            for index in range.iter() {
                let Some(key) = self.tile_at(index) else {
                    continue;
                };
                if !assigned.insert(index) {
                    continue;
                }
                let bounds = self.data.tile_bounds(index);
                let distance = visible_rect.manhattan_internal_distance(bounds) as f32
                    * content_to_screen_scale;
                let tile = store.tile_mut(key);
                tile.set_priority(tree, TilePriority::new(self.resolution, bin, distance));
                tile.set_occluded(tree, false);
            }
        }

        self.visible_rect = visible_rect;
        self.skewport_rect = skewport;
        self.eventually_rect = eventually_rect;
        log::trace!(
            target: "tiles",
            "tiling {} {:?}: {} live tiles, {} prioritized",
            self.contents_scale,
            tree,
            self.tiles.len(),
            assigned.len()
        );
    }

    /// The visible rect extrapolated along its motion since the last update.
    fn compute_skewport(
        &self,
        client: &TilingClient<'_>,
        frame_time_seconds: f64,
        visible_rect: Rect,
    ) -> Rect {
        let Some(last_frame_time) = self.last_frame_time else {
            return visible_rect;
        };
        let time_delta = frame_time_seconds - last_frame_time;
        if time_delta == 0.0 {
            return visible_rect;
        }
        let multiplier = client.skewport_target_time_seconds / time_delta;
        let old = self.last_visible_rect;
        let limit = client.skewport_extrapolation_limit;
        let max_skewport = visible_rect.inset(-limit, -limit, -limit, -limit);

        let bound = f64::from(limit.max(0));
        let extrapolate = |delta: i32| (multiplier * delta as f64).clamp(-bound, bound) as i32;
        let skewport = visible_rect.inset(
            extrapolate(visible_rect.x - old.x),
            extrapolate(visible_rect.y - old.y),
            extrapolate(old.right() - visible_rect.right()),
            extrapolate(old.bottom() - visible_rect.bottom()),
        );
        skewport.intersect(max_skewport).union(visible_rect)
    }

    /// Drops tiles outside `new_rect` and creates missing ones inside it.
    pub fn set_live_tiles_rect(
        &mut self,
        store: &mut TileStore,
        client: &TilingClient<'_>,
        new_rect: Rect,
    ) {
        let new_rect = new_rect.intersect(self.data.tiling_rect());
        let range = self.data.tile_range(new_rect);
        let outside: Vec<TileIndex> = self
            .tiles
            .keys()
            .copied()
            .filter(|index| !range.is_some_and(|range| range.contains(*index)))
            .collect();
        for index in outside {
            self.remove_tile_at(store, index);
        }
        self.live_tiles_rect = new_rect;
        self.create_missing_tiles_in_live_tiles_rect(store, client);
    }

    pub fn create_missing_tiles_in_live_tiles_rect(
        &mut self,
        store: &mut TileStore,
        client: &TilingClient<'_>,
    ) {
        let Some(range) = self.data.tile_range(self.live_tiles_rect) else {
            return;
        };
        for index in range.iter() {
            if self.tiles.contains_key(&index) {
                continue;
            }
            if let Some(key) = self.create_tile(store, client, index) {
                self.tiles.insert(index, key);
            }
        }
    }

    fn create_tile(
        &self,
        store: &mut TileStore,
        client: &TilingClient<'_>,
        index: TileIndex,
    ) -> Option<TileKey> {
        let content_rect = self.data.tile_bounds(index);
        if let Some(shared) = self.shareable_twin_tile(store, client, index, content_rect) {
            store.retain(shared);
            return Some(shared);
        }
        if !client.source.can_raster(content_rect, self.contents_scale) {
            return None;
        }
        let flags = if client.is_mask {
            RasterFlags::empty()
        } else {
            RasterFlags::USE_PICTURE_ANALYSIS
        };
        Some(store.insert(Tile::new(
            client.layer_id,
            content_rect,
            self.contents_scale,
            client.source_frame_number,
            flags,
        )))
    }

    fn shareable_twin_tile(
        &self,
        store: &TileStore,
        client: &TilingClient<'_>,
        index: TileIndex,
        content_rect: Rect,
    ) -> Option<TileKey> {
        let twin_tiling = client.twin?.tiling_at_scale(self.contents_scale)?;
        if twin_tiling.tile_size() != self.tile_size() {
            return None;
        }
        let candidate = twin_tiling.tile_at(index)?;
        if store.get(candidate)?.content_rect() != content_rect {
            return None;
        }
        let layer_rect = content_rect.scale_to_enclosing(1.0 / self.contents_scale);
        if client
            .pending_invalidation
            .is_some_and(|invalidation| invalidation.intersects_rect(layer_rect))
        {
            return None;
        }
        Some(candidate)
    }

    fn remove_tile_at(&mut self, store: &mut TileStore, index: TileIndex) {
        if let Some(key) = self.tiles.remove(&index) {
            store.release(key);
        }
    }

    pub fn remove_all_tiles(&mut self, store: &mut TileStore) {
        for (_, key) in self.tiles.drain() {
            store.release(key);
        }
    }

    /// Removes tiles touching the layer-space region without recreating them.
    pub fn remove_tiles_in_region(&mut self, store: &mut TileStore, layer_region: &Region) {
        let mut doomed = Vec::new();
        for layer_rect in layer_region.rects() {
            let content_rect = layer_rect.scale_to_enclosing(self.contents_scale);
            let Some(range) = self.data.tile_range(content_rect) else {
                continue;
            };
            doomed.extend(range.iter().filter(|index| self.tiles.contains_key(index)));
        }
        for index in doomed {
            self.remove_tile_at(store, index);
        }
    }

    /// Replaces invalidated tiles with fresh ones inside the live rect.
    pub fn invalidate(
        &mut self,
        store: &mut TileStore,
        client: &TilingClient<'_>,
        layer_region: &Region,
    ) {
        if layer_region.is_empty() {
            return;
        }
        self.remove_tiles_in_region(store, layer_region);
        self.create_missing_tiles_in_live_tiles_rect(store, client);
    }

    /// Adapts the tiling to new layer bounds and the current source.
    pub fn update_tiles_to_current_source(
        &mut self,
        store: &mut TileStore,
        client: &TilingClient<'_>,
        layer_invalidation: &Region,
        new_layer_bounds: Size,
        tile_size: Size,
    ) {
        if new_layer_bounds != self.layer_bounds || tile_size != self.tile_size() {
            let content_bounds = new_layer_bounds.scale_to_ceiled(self.contents_scale);
            let new_data = TilingData::new(tile_size, content_bounds);
            let stale: Vec<TileIndex> = self
                .tiles
                .keys()
                .copied()
                .filter(|index| {
                    !new_data.contains_index(*index)
                        || new_data.tile_bounds(*index) != self.data.tile_bounds(*index)
                })
                .collect();
            for index in stale {
                self.remove_tile_at(store, index);
            }
            self.data = new_data;
            self.layer_bounds = new_layer_bounds;
            self.live_tiles_rect = self.live_tiles_rect.intersect(new_data.tiling_rect());
        }
        self.invalidate(store, client, layer_invalidation);
        self.create_missing_tiles_in_live_tiles_rect(store, client);
    }

    pub fn did_become_active(&self, store: &mut TileStore) {
        for key in self.tiles.values() {
            store.tile_mut(*key).did_become_active();
        }
    }

    pub fn did_become_recycled(&mut self, store: &mut TileStore) {
        for key in self.tiles.values() {
            store.tile_mut(*key).did_become_recycled();
        }
        // Priorities stay stale until the next full pass.
        self.last_frame_time = None;
    }

    /// Tiles that still need raster for `tree`, most urgent first.
    pub fn raster_order(&self, store: &TileStore, tree: WhichTree) -> Vec<TileKey> {
        let mut candidates: Vec<(TilePriority, TileIndex, TileKey)> = self
            .tiles
            .iter()
            .filter_map(|(index, key)| {
                let tile = store.tile(*key);
                if !tile.needs_raster() || tile.is_occluded(tree) {
                    return None;
                }
                Some((tile.priority(tree), *index, *key))
            })
            .collect();
        candidates.sort_by(|(a, a_index, _), (b, b_index, _)| {
            a.bin
                .cmp(&b.bin)
                .then(a.distance_to_visible.total_cmp(&b.distance_to_visible))
                .then(a_index.cmp(b_index))
        });
        candidates.into_iter().map(|(_, _, key)| key).collect()
    }

    /// Resource-holding tiles in `category`, furthest from view first.
    pub fn eviction_order(
        &self,
        store: &TileStore,
        tree_priority: TreePriority,
        category: EvictionCategory,
    ) -> Vec<TileKey> {
        let mut candidates: Vec<(f32, TileIndex, TileKey)> = self
            .tiles
            .iter()
            .filter_map(|(index, key)| {
                let tile = store.tile(*key);
                if !tile.has_resource() {
                    return None;
                }
                let priority = tile.priority_for_tree_priority(tree_priority);
                if EvictionCategory::of(&priority, tile.required_for_activation()) != category {
                    return None;
                }
                Some((priority.distance_to_visible, *index, *key))
            })
            .collect();
        candidates.sort_by(|(a, a_index, _), (b, b_index, _)| {
            b.total_cmp(a).then(a_index.cmp(b_index))
        });
        candidates.into_iter().map(|(_, _, key)| key).collect()
    }
}

/// Grows `starting_rect` equally on every side until the part inside
/// `bounds` reaches `target_area`.
pub fn expand_rect_equally_to_area_bounded_by(
    starting_rect: Rect,
    target_area: i64,
    bounds: Rect,
) -> Rect {
    if starting_rect.is_empty() || bounds.is_empty() {
        return Rect::default();
    }
    if bounds.area() <= target_area {
        return bounds;
    }
    let area_at = |delta: i32| {
        starting_rect
            .inset(-delta, -delta, -delta, -delta)
            .intersect(bounds)
            .area()
    };
    let mut low = 0;
    let mut high = starting_rect.manhattan_internal_distance(bounds) + bounds.width + bounds.height;
    if area_at(low) >= target_area {
        return starting_rect.intersect(bounds);
    }
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if area_at(mid) <= target_area {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    starting_rect.inset(-low, -low, -low, -low).intersect(bounds)
}

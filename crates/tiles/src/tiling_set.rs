use model::{Rect, Region, Size};

use crate::coverage::SetCoverage;
use crate::priority::{TileResolution, WhichTree};
use crate::source::Occlusion;
use crate::tile::TileStore;
use crate::tiling::{Tiling, TilingClient};

/// Slices of a set's tiling list, relative to the HIGH and LOW tilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TilingRangeType {
    HigherThanHighRes,
    LowerThanLowRes,
    BetweenHighAndLowRes,
    LowRes,
    HighRes,
}

/// Half-open range of positions in the descending-scale tiling list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingRange {
    pub start: usize,
    pub end: usize,
}

impl TilingRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All tilings of one layer, kept sorted by descending contents scale.
#[derive(Debug, Clone, Default)]
pub struct TilingSet {
    tilings: Vec<Tiling>,
    layer_bounds: Size,
}

impl TilingSet {
    pub fn new(layer_bounds: Size) -> Self {
        Self {
            tilings: Vec::new(),
            layer_bounds,
        }
    }

    pub fn layer_bounds(&self) -> Size {
        self.layer_bounds
    }

    pub fn num_tilings(&self) -> usize {
        self.tilings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tilings.is_empty()
    }

    pub fn tilings(&self) -> &[Tiling] {
        &self.tilings
    }

    pub fn tiling_at(&self, position: usize) -> &Tiling {
        &self.tilings[position]
    }

    pub fn tiling_at_mut(&mut self, position: usize) -> &mut Tiling {
        &mut self.tilings[position]
    }

    pub fn tiling_at_scale(&self, contents_scale: f32) -> Option<&Tiling> {
        self.tilings
            .iter()
            .find(|tiling| tiling.contents_scale() == contents_scale)
    }

    pub fn tiling_at_scale_mut(&mut self, contents_scale: f32) -> Option<&mut Tiling> {
        self.tilings
            .iter_mut()
            .find(|tiling| tiling.contents_scale() == contents_scale)
    }

    pub fn find_tiling_with_resolution(&self, resolution: TileResolution) -> Option<&Tiling> {
        self.tilings
            .iter()
            .find(|tiling| tiling.resolution() == resolution)
    }

    pub fn num_tilings_with_resolution(&self, resolution: TileResolution) -> usize {
        self.tilings
            .iter()
            .filter(|tiling| tiling.resolution() == resolution)
            .count()
    }

    pub fn num_high_res_tilings(&self) -> usize {
        self.num_tilings_with_resolution(TileResolution::High)
    }

    pub fn num_low_res_tilings(&self) -> usize {
        self.num_tilings_with_resolution(TileResolution::Low)
    }

    /// Inserts a tiling at `contents_scale`. Refused when one already exists
    /// at that exact scale or the scale is below `minimum_contents_scale`.
    pub fn add_tiling(
        &mut self,
        contents_scale: f32,
        tile_size: Size,
        minimum_contents_scale: f32,
    ) -> Option<&mut Tiling> {
        if contents_scale < minimum_contents_scale || self.tiling_at_scale(contents_scale).is_some()
        {
            return None;
        }
        let position = self
            .tilings
            .iter()
            .position(|tiling| tiling.contents_scale() < contents_scale)
            .unwrap_or(self.tilings.len());
        self.tilings.insert(
            position,
            Tiling::new(contents_scale, self.layer_bounds, tile_size),
        );
        log::debug!(
            target: "tiles",
            "added tiling at scale {contents_scale} with {}x{} tiles",
            tile_size.width,
            tile_size.height
        );
        Some(&mut self.tilings[position])
    }

    pub fn remove_tiling(&mut self, store: &mut TileStore, contents_scale: f32) -> bool {
        let Some(position) = self
            .tilings
            .iter()
            .position(|tiling| tiling.contents_scale() == contents_scale)
        else {
            return false;
        };
        let mut tiling = self.tilings.remove(position);
        tiling.remove_all_tiles(store);
        log::debug!(target: "tiles", "removed tiling at scale {contents_scale}");
        true
    }

    pub fn remove_all_tilings(&mut self, store: &mut TileStore) {
        for mut tiling in self.tilings.drain(..) {
            tiling.remove_all_tiles(store);
        }
    }

    pub fn coverage<'a>(
        &'a self,
        store: &'a TileStore,
        dest_scale: f32,
        dest_rect: Rect,
        ideal_contents_scale: f32,
    ) -> SetCoverage<'a> {
        SetCoverage::new(self, store, dest_scale, dest_rect, ideal_contents_scale)
    }

    pub fn did_become_active(&self, store: &mut TileStore) {
        for tiling in &self.tilings {
            tiling.did_become_active(store);
        }
    }

    pub fn did_become_recycled(&mut self, store: &mut TileStore) {
        for tiling in &mut self.tilings {
            tiling.did_become_recycled(store);
        }
    }

    pub fn remove_tiles_in_region(&mut self, store: &mut TileStore, layer_region: &Region) {
        if layer_region.is_empty() {
            return;
        }
        for tiling in &mut self.tilings {
            tiling.remove_tiles_in_region(store, layer_region);
        }
    }

    /// Mirrors the scales and resolution tags of `other` (the active twin's
    /// set). Returns whether a HIGH tiling was carried over.
    pub fn sync_tilings(
        &mut self,
        store: &mut TileStore,
        client: &TilingClient<'_>,
        other: &TilingSet,
        new_layer_bounds: Size,
        layer_invalidation: &Region,
        minimum_contents_scale: f32,
        tile_size_for: impl Fn(Size) -> Size,
    ) -> bool {
        if new_layer_bounds.is_empty() {
            self.remove_all_tilings(store);
            self.layer_bounds = new_layer_bounds;
            return false;
        }

        let mut index = 0;
        while index < self.tilings.len() {
            let scale = self.tilings[index].contents_scale();
            if scale >= minimum_contents_scale && other.tiling_at_scale(scale).is_some() {
                index += 1;
                continue;
            }
            let mut doomed = self.tilings.remove(index);
            doomed.remove_all_tiles(store);
        }

        let mut have_high_res_tiling = false;
        for other_tiling in &other.tilings {
            let scale = other_tiling.contents_scale();
            if scale < minimum_contents_scale {
                continue;
            }
            let resolution = other_tiling.resolution();
            let tile_size = tile_size_for(new_layer_bounds.scale_to_ceiled(scale));
            if let Some(existing) = self.tiling_at_scale_mut(scale) {
                existing.set_resolution(resolution);
                existing.update_tiles_to_current_source(
                    store,
                    client,
                    layer_invalidation,
                    new_layer_bounds,
                    tile_size,
                );
            } else {
                let mut created = Tiling::new(scale, new_layer_bounds, tile_size);
                created.set_resolution(resolution);
                self.tilings.push(created);
            }
            if resolution == TileResolution::High {
                have_high_res_tiling = true;
            }
        }

        self.tilings
            .sort_by(|a, b| b.contents_scale().total_cmp(&a.contents_scale()));
        self.layer_bounds = new_layer_bounds;
        have_high_res_tiling
    }

    pub fn needs_update_for_frame_at_time(&self, frame_time_seconds: f64) -> bool {
        self.tilings
            .iter()
            .any(|tiling| tiling.needs_update_for_frame_at_time(frame_time_seconds))
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
        for tiling in &mut self.tilings {
            tiling.update_tile_priorities(
                store,
                client,
                tree,
                visible_layer_rect,
                ideal_contents_scale,
                frame_time_seconds,
                occlusion,
            );
        }
    }

    pub fn tiling_range(&self, range_type: TilingRangeType) -> TilingRange {
        let count = self.tilings.len();
        let mut high = TilingRange { start: 0, end: 0 };
        let mut low = TilingRange {
            start: count,
            end: count,
        };
        for (position, tiling) in self.tilings.iter().enumerate() {
            match tiling.resolution() {
                TileResolution::High => {
                    high = TilingRange {
                        start: position,
                        end: position + 1,
                    }
                }
                TileResolution::Low => {
                    low = TilingRange {
                        start: position,
                        end: position + 1,
                    }
                }
                TileResolution::NonIdeal => {}
            }
        }
        match range_type {
            TilingRangeType::HigherThanHighRes => TilingRange {
                start: 0,
                end: high.start,
            },
            TilingRangeType::HighRes => high,
            TilingRangeType::BetweenHighAndLowRes => {
                if high.end <= low.start {
                    TilingRange {
                        start: high.end,
                        end: low.start,
                    }
                } else {
                    TilingRange {
                        start: low.end,
                        end: high.start,
                    }
                }
            }
            TilingRangeType::LowRes => low,
            TilingRangeType::LowerThanLowRes => TilingRange {
                start: low.end,
                end: count,
            },
        }
    }
}

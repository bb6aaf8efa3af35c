//! Coverage walks: which tile draws each part of a destination rect.
//!
//! Destination rects live in a space scaled by `dest_scale` from layer space.
//! Tile edges are mapped into that space with a single rounding rule, so
//! neighbouring tiles produce geometry that neither overlaps nor leaves gaps.

use std::collections::VecDeque;

use model::{Rect, Region, TileIndex, TileRange};

use crate::tile::{TileKey, TileStore};
use crate::tiling::Tiling;
use crate::tiling_set::TilingSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageTile {
    pub index: TileIndex,
    pub tile: Option<TileKey>,
    /// Part of the destination rect drawn from this tile, in destination space.
    pub geometry_rect: Rect,
}

/// Walks the tile grid of one tiling under a destination rect, row by row.
#[derive(Debug, Clone)]
pub struct TilingCoverage<'a> {
    tiling: &'a Tiling,
    dest_rect: Rect,
    content_to_dest: f32,
    indices: Option<TileRangeCursor>,
}

#[derive(Debug, Clone, Copy)]
struct TileRangeCursor {
    range: TileRange,
    next: Option<TileIndex>,
}

impl TileRangeCursor {
    fn new(range: TileRange) -> Self {
        Self {
            range,
            next: Some(TileIndex::new(range.left, range.top)),
        }
    }

    fn advance(&mut self) -> Option<TileIndex> {
        let current = self.next?;
        self.next = if current.i < self.range.right {
            Some(TileIndex::new(current.i + 1, current.j))
        } else if current.j < self.range.bottom {
            Some(TileIndex::new(self.range.left, current.j + 1))
        } else {
            None
        };
        Some(current)
    }
}

impl<'a> TilingCoverage<'a> {
    pub fn new(tiling: &'a Tiling, dest_scale: f32, dest_rect: Rect) -> Self {
        assert!(
            dest_scale.is_finite() && dest_scale > 0.0,
            "coverage dest scale must be finite and positive: {dest_scale}"
        );
        let dest_to_content = tiling.contents_scale() / dest_scale;
        // One extra pixel so rounding never drops an edge tile.
        let content_rect = dest_rect
            .scale_to_enclosing(dest_to_content)
            .inset(-1, -1, -1, -1);
        let indices = tiling
            .tiling_data()
            .tile_range(content_rect)
            .map(TileRangeCursor::new);
        Self {
            tiling,
            dest_rect,
            content_to_dest: 1.0 / dest_to_content,
            indices,
        }
    }

    fn map_edge(&self, content_edge: i32) -> i32 {
        (content_edge as f32 * self.content_to_dest).ceil() as i32
    }

    fn geometry_for(&self, index: TileIndex) -> Rect {
        let bounds = self.tiling.tiling_data().tile_bounds(index);
        Rect::from_ltrb(
            self.map_edge(bounds.x),
            self.map_edge(bounds.y),
            self.map_edge(bounds.right()),
            self.map_edge(bounds.bottom()),
        )
        .intersect(self.dest_rect)
    }
}

impl Iterator for TilingCoverage<'_> {
    type Item = CoverageTile;

    fn next(&mut self) -> Option<CoverageTile> {
        loop {
            let index = self.indices.as_mut()?.advance()?;
            let geometry_rect = self.geometry_for(index);
            if geometry_rect.is_empty() {
                continue;
            }
            return Some(CoverageTile {
                index,
                tile: self.tiling.tile_at(index),
                geometry_rect,
            });
        }
    }
}

/// Covers a destination rect from the tilings of a set, trying tilings in
/// order of closeness to the ideal scale. Parts no tiling can draw are
/// yielded last, without a tile.
#[derive(Debug)]
pub struct SetCoverage<'a> {
    set: &'a TilingSet,
    store: &'a TileStore,
    dest_scale: f32,
    tiling_order: Vec<usize>,
    next_tiling: usize,
    current_tiling: Option<usize>,
    pending_rects: VecDeque<Rect>,
    current: Option<(TilingCoverage<'a>, Region)>,
    missing: Region,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetCoverageTile {
    /// Position in the set's tiling list, `None` for uncovered geometry.
    pub tiling: Option<usize>,
    pub tile: Option<TileKey>,
    pub geometry_rect: Rect,
}

impl<'a> SetCoverage<'a> {
    pub fn new(
        set: &'a TilingSet,
        store: &'a TileStore,
        dest_scale: f32,
        dest_rect: Rect,
        ideal_contents_scale: f32,
    ) -> Self {
        let mut tiling_order: Vec<usize> = (0..set.num_tilings()).collect();
        tiling_order.sort_by(|a, b| {
            let a_scale = set.tiling_at(*a).contents_scale();
            let b_scale = set.tiling_at(*b).contents_scale();
            let a_distance = (a_scale - ideal_contents_scale).abs();
            let b_distance = (b_scale - ideal_contents_scale).abs();
            a_distance
                .total_cmp(&b_distance)
                .then(b_scale.total_cmp(&a_scale))
        });
        Self {
            set,
            store,
            dest_scale,
            tiling_order,
            next_tiling: 0,
            current_tiling: None,
            pending_rects: VecDeque::new(),
            current: None,
            missing: Region::from_rect(dest_rect),
        }
    }

    /// Moves the missing region into the queue for the next tiling.
    fn start_next_tiling(&mut self) -> bool {
        let Some(position) = self.tiling_order.get(self.next_tiling).copied() else {
            self.current_tiling = None;
            return false;
        };
        self.next_tiling += 1;
        self.current_tiling = Some(position);
        self.pending_rects = self.missing.rects().iter().copied().collect();
        self.missing.clear();
        true
    }
}

impl Iterator for SetCoverage<'_> {
    type Item = SetCoverageTile;

    fn next(&mut self) -> Option<SetCoverageTile> {
        let store = self.store;
        loop {
            if let Some((walk, remaining)) = self.current.as_mut() {
                match walk.next() {
                    Some(covered) => {
                        let ready = covered
                            .tile
                            .filter(|key| store.tile(*key).is_ready_to_draw());
                        if let Some(key) = ready {
                            remaining.subtract_rect(covered.geometry_rect);
                            return Some(SetCoverageTile {
                                tiling: self.current_tiling,
                                tile: Some(key),
                                geometry_rect: covered.geometry_rect,
                            });
                        }
                        continue;
                    }
                    None => {
                        if let Some((_, remaining)) = self.current.take() {
                            self.missing.union(&remaining);
                        }
                    }
                }
            }

            if let Some(rect) = self.pending_rects.pop_front() {
                match self.current_tiling {
                    Some(position) => {
                        let tiling = self.set.tiling_at(position);
                        self.current = Some((
                            TilingCoverage::new(tiling, self.dest_scale, rect),
                            Region::from_rect(rect),
                        ));
                    }
                    None => {
                        return Some(SetCoverageTile {
                            tiling: None,
                            tile: None,
                            geometry_rect: rect,
                        });
                    }
                }
                continue;
            }

            if self.missing.is_empty() {
                return None;
            }
            if !self.start_next_tiling() {
                // No tiling left: flush what is still missing as bare geometry.
                self.pending_rects = self.missing.rects().iter().copied().collect();
                self.missing.clear();
            }
        }
    }
}

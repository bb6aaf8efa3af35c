use tiles::{PriorityBin, TileKey, TileResolution, TileStore, WhichTree};

use crate::context::TreeContext;
use crate::coordinator::LayerTileCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stage {
    tier: Tier,
    bin: PriorityBin,
}

const HIGH_RES_FIRST: [Stage; 4] = [
    Stage { tier: Tier::High, bin: PriorityBin::Now },
    Stage { tier: Tier::Low, bin: PriorityBin::Now },
    Stage { tier: Tier::High, bin: PriorityBin::Soon },
    Stage { tier: Tier::High, bin: PriorityBin::Eventually },
];

const LOW_RES_FIRST: [Stage; 4] = [
    Stage { tier: Tier::Low, bin: PriorityBin::Now },
    Stage { tier: Tier::High, bin: PriorityBin::Now },
    Stage { tier: Tier::High, bin: PriorityBin::Soon },
    Stage { tier: Tier::High, bin: PriorityBin::Eventually },
];

#[derive(Debug, Default)]
struct TierCursor {
    order: Vec<TileKey>,
    position: usize,
}

impl TierCursor {
    fn peek(&self) -> Option<TileKey> {
        self.order.get(self.position).copied()
    }
}

/// Tiles of one layer that still need raster, in staged priority order.
#[derive(Debug)]
pub struct RasterPriorityIterator<'a> {
    store: &'a TileStore,
    tree: WhichTree,
    stages: &'static [Stage; 4],
    high: TierCursor,
    low: TierCursor,
    current_stage: usize,
}

impl<'a> RasterPriorityIterator<'a> {
    pub fn new(
        layer: &LayerTileCoordinator,
        store: &'a TileStore,
        ctx: &TreeContext,
        prioritize_low_res: bool,
    ) -> Self {
        let stages = if prioritize_low_res {
            &LOW_RES_FIRST
        } else {
            &HIGH_RES_FIRST
        };
        let mut iterator = Self {
            store,
            tree: WhichTree::Active,
            stages,
            high: TierCursor::default(),
            low: TierCursor::default(),
            current_stage: stages.len(),
        };
        let Some(tree) = ctx.generation.which_tree() else {
            return iterator;
        };
        if layer.tilings().is_empty() || !layer.has_valid_tile_priorities(ctx) {
            return iterator;
        }

        let tilings = layer.tilings();
        let order_of = |resolution| {
            tilings
                .find_tiling_with_resolution(resolution)
                .map(|tiling| tiling.raster_order(store, tree))
                .unwrap_or_default()
        };
        iterator.tree = tree;
        iterator.high.order = order_of(TileResolution::High);
        iterator.low.order = order_of(TileResolution::Low);
        iterator.current_stage = 0;
        iterator.skip_to_matching_stage();
        iterator
    }

    pub fn tree(&self) -> WhichTree {
        self.tree
    }

    pub fn is_empty(&self) -> bool {
        self.current_stage >= self.stages.len()
    }

    /// The tile `next` would return.
    pub fn peek(&self) -> Option<TileKey> {
        let stage = self.stages.get(self.current_stage)?;
        self.cursor(stage.tier).peek()
    }

    fn cursor(&self, tier: Tier) -> &TierCursor {
        match tier {
            Tier::High => &self.high,
            Tier::Low => &self.low,
        }
    }

    fn cursor_mut(&mut self, tier: Tier) -> &mut TierCursor {
        match tier {
            Tier::High => &mut self.high,
            Tier::Low => &mut self.low,
        }
    }

    fn stage_has_tile(&self, stage: Stage) -> bool {
        self.cursor(stage.tier)
            .peek()
            .is_some_and(|key| self.store.tile(key).priority(self.tree).bin == stage.bin)
    }

    fn skip_to_matching_stage(&mut self) {
        while let Some(stage) = self.stages.get(self.current_stage) {
            if self.stage_has_tile(*stage) {
                return;
            }
            self.current_stage += 1;
        }
    }
}

impl Iterator for RasterPriorityIterator<'_> {
    type Item = TileKey;

    fn next(&mut self) -> Option<TileKey> {
        let stage = *self.stages.get(self.current_stage)?;
        let cursor = self.cursor_mut(stage.tier);
        let key = cursor.peek()?;
        cursor.position += 1;
        if !self.stage_has_tile(stage) {
            self.current_stage += 1;
            self.skip_to_matching_stage();
        }
        Some(key)
    }
}

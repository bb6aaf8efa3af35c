use tiles::{
    EVICTION_CATEGORIES, EvictionCategory, TileKey, TileStore, TilingRangeType, TilingSet,
    TreePriority,
};

use crate::coordinator::LayerTileCoordinator;

const RANGE_ORDER: [TilingRangeType; 5] = [
    TilingRangeType::HigherThanHighRes,
    TilingRangeType::LowerThanLowRes,
    TilingRangeType::BetweenHighAndLowRes,
    TilingRangeType::LowRes,
    TilingRangeType::HighRes,
];

const STEP_COUNT: usize = EVICTION_CATEGORIES.len() * RANGE_ORDER.len();

static_assertions::const_assert_eq!(STEP_COUNT, 30);

/// Walk order of the eviction iterator: every range for a category before
/// the next category.
pub const EVICTION_STEPS: [(EvictionCategory, TilingRangeType); STEP_COUNT] = {
    let mut steps = [(EvictionCategory::Eventually, TilingRangeType::HigherThanHighRes); STEP_COUNT];
    let mut index = 0;
    while index < STEP_COUNT {
        steps[index] = (
            EVICTION_CATEGORIES[index / RANGE_ORDER.len()],
            RANGE_ORDER[index % RANGE_ORDER.len()],
        );
        index += 1;
    }
    steps
};

fn walks_backwards(range_type: TilingRangeType) -> bool {
    matches!(
        range_type,
        TilingRangeType::LowerThanLowRes | TilingRangeType::BetweenHighAndLowRes
    )
}

/// Resource-holding tiles of one layer, least valuable first.
#[derive(Debug)]
pub struct EvictionPriorityIterator<'a> {
    tilings: &'a TilingSet,
    store: &'a TileStore,
    tree_priority: TreePriority,
    step: usize,
    /// Tiling positions of the current step not yet walked, in walk order.
    tiling_queue: Vec<usize>,
    current: Vec<TileKey>,
    position: usize,
}

impl<'a> EvictionPriorityIterator<'a> {
    pub fn new(
        layer: &'a LayerTileCoordinator,
        store: &'a TileStore,
        tree_priority: TreePriority,
    ) -> Self {
        Self::for_tilings(layer.tilings(), store, tree_priority)
    }

    pub fn for_tilings(
        tilings: &'a TilingSet,
        store: &'a TileStore,
        tree_priority: TreePriority,
    ) -> Self {
        let mut iterator = Self {
            tilings,
            store,
            tree_priority,
            step: 0,
            tiling_queue: Vec::new(),
            current: Vec::new(),
            position: 0,
        };
        if tilings.is_empty() {
            iterator.step = STEP_COUNT;
            return iterator;
        }
        iterator.queue_step_tilings();
        iterator.advance_to_next_tile();
        iterator
    }

    pub fn tree_priority(&self) -> TreePriority {
        self.tree_priority
    }

    /// The category of the tile `next` would return.
    pub fn current_category(&self) -> Option<EvictionCategory> {
        EVICTION_STEPS.get(self.step).map(|(category, _)| *category)
    }

    pub fn peek(&self) -> Option<TileKey> {
        self.current.get(self.position).copied()
    }

    fn queue_step_tilings(&mut self) {
        let Some((_, range_type)) = EVICTION_STEPS.get(self.step) else {
            return;
        };
        let range = self.tilings.tiling_range(*range_type);
        // Popped from the back, so store the walk order reversed.
        self.tiling_queue = (range.start..range.end).collect();
        if !walks_backwards(*range_type) {
            self.tiling_queue.reverse();
        }
    }

    fn advance_to_next_tile(&mut self) {
        while self.step < STEP_COUNT {
            if self.position < self.current.len() {
                return;
            }
            if let Some(position) = self.tiling_queue.pop() {
                let (category, _) = EVICTION_STEPS[self.step];
                self.current = self.tilings.tiling_at(position).eviction_order(
                    self.store,
                    self.tree_priority,
                    category,
                );
                self.position = 0;
                continue;
            }
            self.step += 1;
            self.queue_step_tilings();
        }
        self.current.clear();
        self.position = 0;
    }
}

impl Iterator for EvictionPriorityIterator<'_> {
    type Item = TileKey;

    fn next(&mut self) -> Option<TileKey> {
        let key = self.peek()?;
        self.position += 1;
        self.advance_to_next_tile();
        Some(key)
    }
}

//! Per-frame raster budget and memory-pressure eviction across every tree of
//! a `LayerTreeHost`, plus the channel that carries raster work to a backend
//! thread.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use layer_tree::LayerTreeHost;
use picture_layer::{EvictionPriorityIterator, RasterPriorityIterator};
use serde::{Deserialize, Serialize};
use tiles::{ContentSource, EvictionCategory, ResourceId, TileKey, TileStore, TreePriority};

mod dispatch;

pub use dispatch::{
    RasterBackend, RasterCompletion, RasterDispatchError, RasterDispatcher, RasterJob,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSchedulerConfig {
    pub max_raster_tiles_per_frame: usize,
    /// Resource-holding tiles allowed before eviction starts.
    pub max_resident_tiles: usize,
    pub prioritize_low_res: bool,
    pub tree_priority: TreePriority,
}

impl Default for FrameSchedulerConfig {
    fn default() -> Self {
        Self {
            max_raster_tiles_per_frame: 32,
            max_resident_tiles: 256,
            prioritize_low_res: false,
            tree_priority: TreePriority::SamePriorityForBothTrees,
        }
    }
}

/// Work picked for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameSchedule {
    pub frame_sequence_id: u64,
    /// Most urgent first. Tiles are not marked in flight until dispatched.
    pub raster: Vec<RasterJob>,
    pub evicted: Vec<(TileKey, ResourceId)>,
}

#[derive(Debug, Clone)]
pub struct FrameScheduler {
    config: FrameSchedulerConfig,
    next_frame_sequence_id: u64,
}

impl FrameScheduler {
    pub fn new(config: FrameSchedulerConfig) -> Self {
        Self {
            config,
            next_frame_sequence_id: 1,
        }
    }

    pub fn config(&self) -> FrameSchedulerConfig {
        self.config
    }

    /// Fills the raster budget from the pending and active trees, then evicts
    /// the least valuable resources while over the residency limit.
    pub fn schedule_frame(&mut self, host: &mut LayerTreeHost) -> FrameSchedule {
        let frame_sequence_id = self.next_frame_sequence_id;
        self.next_frame_sequence_id += 1;

        let raster = self.collect_raster_jobs(host);
        let scheduled: HashSet<TileKey> = raster.iter().map(|job| job.tile).collect();
        let victims = self.collect_eviction_victims(host, &scheduled);

        let store = host.store_mut();
        let evicted: Vec<(TileKey, ResourceId)> = victims
            .into_iter()
            .filter_map(|key| store.evict(key).map(|resource| (key, resource)))
            .collect();

        log::debug!(
            target: "frame_scheduler",
            "frame {frame_sequence_id}: {} raster jobs, {} tiles evicted, {} resident",
            raster.len(),
            evicted.len(),
            store.resident_count()
        );
        FrameSchedule {
            frame_sequence_id,
            raster,
            evicted,
        }
    }

    fn collect_raster_jobs(&self, host: &LayerTreeHost) -> Vec<RasterJob> {
        let store = host.store();
        let trees = host.pending_tree().into_iter().chain([host.active_tree()]);
        let mut queues: Vec<(RasterPriorityIterator<'_>, &Arc<dyn ContentSource>)> = Vec::new();
        for tree in trees {
            let ctx = host.tree_context(tree);
            for layer in tree.layers() {
                let iterator =
                    RasterPriorityIterator::new(layer, store, &ctx, self.config.prioritize_low_res);
                if !iterator.is_empty() {
                    queues.push((iterator, layer.source()));
                }
            }
        }

        let tree_priority = self.config.tree_priority;
        let mut taken = HashSet::new();
        let mut jobs = Vec::new();
        while jobs.len() < self.config.max_raster_tiles_per_frame {
            let best = queues
                .iter()
                .enumerate()
                .filter_map(|(position, (iterator, _))| iterator.peek().map(|key| (position, key)))
                .min_by(|(_, first), (_, second)| {
                    compare_for_raster(store, tree_priority, *first, *second)
                });
            let Some((position, key)) = best else {
                break;
            };
            let (iterator, source) = &mut queues[position];
            iterator.next();
            // Tiles shared by twins come out of both trees.
            if taken.insert(key) {
                jobs.push(RasterJob::new(key, store.tile(key), Arc::clone(source)));
            }
        }
        jobs
    }

    fn collect_eviction_victims(
        &self,
        host: &LayerTreeHost,
        scheduled: &HashSet<TileKey>,
    ) -> Vec<TileKey> {
        let store = host.store();
        let excess = store
            .resident_count()
            .saturating_sub(self.config.max_resident_tiles);
        if excess == 0 {
            return Vec::new();
        }

        let tree_priority = self.config.tree_priority;
        let trees = host
            .recycle_tree()
            .into_iter()
            .chain(host.pending_tree())
            .chain([host.active_tree()]);
        let mut queues: Vec<EvictionPriorityIterator<'_>> = trees
            .flat_map(|tree| tree.layers())
            .map(|layer| EvictionPriorityIterator::new(layer, store, tree_priority))
            .collect();

        let mut seen = HashSet::new();
        let mut victims = Vec::with_capacity(excess);
        while victims.len() < excess {
            let best = queues
                .iter()
                .enumerate()
                .filter_map(|(position, iterator)| iterator.peek().map(|key| (position, key)))
                .min_by(|(_, first), (_, second)| {
                    compare_for_eviction(store, tree_priority, *first, *second)
                });
            let Some((position, key)) = best else {
                break;
            };
            queues[position].next();
            if scheduled.contains(&key) || !seen.insert(key) {
                continue;
            }
            victims.push(key);
        }
        if victims.len() < excess {
            log::debug!(
                target: "frame_scheduler",
                "only {} of {excess} excess tiles can be evicted",
                victims.len()
            );
        }
        victims
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(FrameSchedulerConfig::default())
    }
}

fn compare_for_raster(
    store: &TileStore,
    tree_priority: TreePriority,
    first: TileKey,
    second: TileKey,
) -> Ordering {
    let first = store.tile(first).priority_for_tree_priority(tree_priority);
    let second = store.tile(second).priority_for_tree_priority(tree_priority);
    first
        .bin
        .cmp(&second.bin)
        .then(first.distance_to_visible.total_cmp(&second.distance_to_visible))
}

/// Lower categories first; within one, furthest from view first.
fn compare_for_eviction(
    store: &TileStore,
    tree_priority: TreePriority,
    first: TileKey,
    second: TileKey,
) -> Ordering {
    let category_and_distance = |key: TileKey| {
        let tile = store.tile(key);
        let priority = tile.priority_for_tree_priority(tree_priority);
        let category = EvictionCategory::of(&priority, tile.required_for_activation());
        (category.position(), priority.distance_to_visible)
    };
    let (first_category, first_distance) = category_and_distance(first);
    let (second_category, second_distance) = category_and_distance(second);
    first_category
        .cmp(&second_category)
        .then(second_distance.total_cmp(&first_distance))
}

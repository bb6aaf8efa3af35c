use bitflags::bitflags;
use model::Rect;
use slotmap::SlotMap;

use crate::priority::{TilePriority, TreePriority, WhichTree};
use crate::LayerId;

slotmap::new_key_type! {
    pub struct TileKey;
}

// Keys travel with raster jobs to worker threads.
static_assertions::assert_impl_all!(TileKey: Send, Sync, Copy);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileReadiness {
    #[default]
    NotReady,
    Resource(ResourceId),
    SolidColor(u32),
    FallbackPicture,
}

impl TileReadiness {
    pub fn is_ready_to_draw(self) -> bool {
        !matches!(self, TileReadiness::NotReady)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RasterFlags: u8 {
        const USE_PICTURE_ANALYSIS = 1 << 0;
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    layer_id: LayerId,
    content_rect: Rect,
    contents_scale: f32,
    source_frame_number: u64,
    flags: RasterFlags,
    readiness: TileReadiness,
    raster_in_flight: bool,
    priorities: [TilePriority; 2],
    occluded: [bool; 2],
}

impl Tile {
    pub fn new(
        layer_id: LayerId,
        content_rect: Rect,
        contents_scale: f32,
        source_frame_number: u64,
        flags: RasterFlags,
    ) -> Self {
        Self {
            layer_id,
            content_rect,
            contents_scale,
            source_frame_number,
            flags,
            readiness: TileReadiness::NotReady,
            raster_in_flight: false,
            priorities: [TilePriority::default(); 2],
            occluded: [false; 2],
        }
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    pub fn content_rect(&self) -> Rect {
        self.content_rect
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }

    pub fn flags(&self) -> RasterFlags {
        self.flags
    }

    pub fn readiness(&self) -> TileReadiness {
        self.readiness
    }

    pub fn is_ready_to_draw(&self) -> bool {
        self.readiness.is_ready_to_draw()
    }

    pub fn has_resource(&self) -> bool {
        matches!(self.readiness, TileReadiness::Resource(_))
    }

    pub fn is_raster_in_flight(&self) -> bool {
        self.raster_in_flight
    }

    /// Not ready and not already handed to the raster backend.
    pub fn needs_raster(&self) -> bool {
        !self.is_ready_to_draw() && !self.raster_in_flight
    }

    pub fn priority(&self, tree: WhichTree) -> TilePriority {
        self.priorities[tree.index()]
    }

    pub fn set_priority(&mut self, tree: WhichTree, priority: TilePriority) {
        self.priorities[tree.index()] = priority;
    }

    pub fn combined_priority(&self) -> TilePriority {
        TilePriority::combine(
            self.priorities[WhichTree::Active.index()],
            self.priorities[WhichTree::Pending.index()],
        )
    }

    pub fn priority_for_tree_priority(&self, tree_priority: TreePriority) -> TilePriority {
        match tree_priority {
            TreePriority::SamePriorityForBothTrees => self.combined_priority(),
            TreePriority::SmoothnessTakesPriority => self.priority(WhichTree::Active),
            TreePriority::NewContentTakesPriority => self.priority(WhichTree::Pending),
        }
    }

    pub fn is_occluded(&self, tree: WhichTree) -> bool {
        self.occluded[tree.index()]
    }

    pub fn set_occluded(&mut self, tree: WhichTree, occluded: bool) {
        self.occluded[tree.index()] = occluded;
    }

    pub fn required_for_activation(&self) -> bool {
        self.priorities[WhichTree::Pending.index()].required_for_activation
    }

    pub fn mark_required_for_activation(&mut self) {
        self.priorities[WhichTree::Pending.index()].required_for_activation = true;
    }

    /// Pending priority becomes the active one; the pending slot starts over.
    pub fn did_become_active(&mut self) {
        let mut promoted = self.priorities[WhichTree::Pending.index()];
        promoted.required_for_activation = false;
        self.priorities[WhichTree::Active.index()] = promoted;
        self.priorities[WhichTree::Pending.index()] = TilePriority::default();
        self.occluded[WhichTree::Active.index()] = self.occluded[WhichTree::Pending.index()];
        self.occluded[WhichTree::Pending.index()] = false;
    }

    pub fn did_become_recycled(&mut self) {
        self.priorities[WhichTree::Active.index()] = TilePriority::default();
        self.occluded[WhichTree::Active.index()] = false;
    }
}

#[derive(Debug)]
struct TileEntry {
    tile: Tile,
    ref_count: u32,
}

/// Arena of tiles shared by the tilings of every tree generation.
///
/// Each tiling that holds a key owns one reference; the tile is destroyed
/// when the last reference is released.
#[derive(Debug, Default)]
pub struct TileStore {
    tiles: SlotMap<TileKey, TileEntry>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn insert(&mut self, tile: Tile) -> TileKey {
        self.tiles.insert(TileEntry { tile, ref_count: 1 })
    }

    pub fn retain(&mut self, key: TileKey) {
        let entry = self
            .tiles
            .get_mut(key)
            .unwrap_or_else(|| panic!("retain requested for unknown tile {key:?}"));
        entry.ref_count = entry
            .ref_count
            .checked_add(1)
            .expect("tile reference count overflow");
    }

    /// Drops one reference and reports whether the tile was destroyed.
    pub fn release(&mut self, key: TileKey) -> bool {
        let entry = self
            .tiles
            .get_mut(key)
            .unwrap_or_else(|| panic!("release requested for unknown tile {key:?}"));
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            self.tiles.remove(key);
            return true;
        }
        false
    }

    pub fn ref_count(&self, key: TileKey) -> u32 {
        self.tiles.get(key).map_or(0, |entry| entry.ref_count)
    }

    pub fn contains(&self, key: TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    pub fn get(&self, key: TileKey) -> Option<&Tile> {
        self.tiles.get(key).map(|entry| &entry.tile)
    }

    pub fn get_mut(&mut self, key: TileKey) -> Option<&mut Tile> {
        self.tiles.get_mut(key).map(|entry| &mut entry.tile)
    }

    pub fn tile(&self, key: TileKey) -> &Tile {
        self.get(key)
            .unwrap_or_else(|| panic!("tile {key:?} is not in the store"))
    }

    pub fn tile_mut(&mut self, key: TileKey) -> &mut Tile {
        self.get_mut(key)
            .unwrap_or_else(|| panic!("tile {key:?} is not in the store"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileKey, &Tile)> {
        self.tiles.iter().map(|(key, entry)| (key, &entry.tile))
    }

    pub fn resident_count(&self) -> usize {
        self.tiles
            .values()
            .filter(|entry| entry.tile.has_resource())
            .count()
    }

    pub fn begin_raster(&mut self, key: TileKey) {
        self.tile_mut(key).raster_in_flight = true;
    }

    /// Records a raster result. Completions for tiles destroyed while the
    /// work was in flight are dropped and reported as `false`.
    pub fn complete_raster(&mut self, key: TileKey, readiness: TileReadiness) -> bool {
        let Some(tile) = self.get_mut(key) else {
            return false;
        };
        tile.raster_in_flight = false;
        tile.readiness = readiness;
        true
    }

    /// Releases the tile's resource, leaving the tile itself in place.
    pub fn evict(&mut self, key: TileKey) -> Option<ResourceId> {
        let tile = self.get_mut(key)?;
        let TileReadiness::Resource(resource) = tile.readiness else {
            return None;
        };
        tile.readiness = TileReadiness::NotReady;
        Some(resource)
    }
}

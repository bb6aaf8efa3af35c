//! Tiles, tilings and tiling sets for layers rastered from recorded content.
//!
//! A `Tiling` is a sparse grid of tiles at one contents scale. A `TilingSet`
//! keeps every tiling of a layer ordered by descending scale. Tiles live in a
//! shared `TileStore` so a pending tiling and its active twin can hold the
//! same tile.

mod coverage;
mod priority;
mod source;
mod tile;
mod tile_size;
mod tiling;
mod tiling_set;

pub use coverage::{CoverageTile, SetCoverage, SetCoverageTile, TilingCoverage};
pub use priority::{
    EVICTION_CATEGORIES, EvictionCategory, PriorityBin, TilePriority, TileResolution,
    TreePriority, WhichTree,
};
pub use source::{ContentSource, Occlusion};
pub use tile::{RasterFlags, ResourceId, Tile, TileKey, TileReadiness, TileStore};
pub use tile_size::TileSizePolicy;
pub use tiling::{expand_rect_equally_to_area_bounded_by, Tiling, TilingClient};
pub use tiling_set::{TilingRange, TilingRangeType, TilingSet};

/// Identity of a layer, stable across tree generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);
